// author: kodeholic (powered by Claude)
// HttpState - HTTP 핸들러 공유 상태

use std::sync::Arc;

use crate::core::{EntryQueue, MatchingPool, StatusRegistry, UserHub};
use crate::handoff::SessionManager;
use crate::matching::{DisconnectSweeper, MatchService};
use crate::trace::TraceHub;
use crate::utils::current_timestamp;

#[derive(Clone)]
pub struct HttpState {
    pub matching:      Arc<MatchService>,
    pub sessions:      Arc<SessionManager>,
    pub registry:      StatusRegistry,
    pub queue:         EntryQueue,
    pub pool:          MatchingPool,
    pub sweeper:       Arc<DisconnectSweeper>,
    pub user_hub:      Arc<UserHub>,
    pub trace_hub:     Arc<TraceHub>,
    /// 서버 프로세스 시작 시각 (Unix millis) - uptime 계산용
    pub start_time_ms: u64,
}

impl HttpState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matching:  Arc<MatchService>,
        sessions:  Arc<SessionManager>,
        registry:  StatusRegistry,
        queue:     EntryQueue,
        pool:      MatchingPool,
        sweeper:   Arc<DisconnectSweeper>,
        user_hub:  Arc<UserHub>,
        trace_hub: Arc<TraceHub>,
    ) -> Self {
        Self {
            matching, sessions, registry, queue, pool, sweeper, user_hub, trace_hub,
            start_time_ms: current_timestamp(),
        }
    }
}
