// author: kodeholic (powered by Claude)
// TtlHandler - lease 만료 알림 구독자
//
// 만료 시 상태 전이:
//   waiting  ──expire──▶ timeout   (clear_user 발행 + 유예 lease)
//   matching ──expire──▶ matching  (lease 재연장 - 판단 중인 유저는 내보내지 않음)
//   matched | timeout | cancelled | disconnected ──expire──▶ (삭제)
//
// 레지스트리에 없는 유저의 만료는 로그만 남기고 무시한다.
// 전이/삭제는 읽은 (sessionKey, status) 가 그대로일 때만 적용된다. 그 사이 바뀌었으면 다시 읽고 판단.
// 워커 루프와 스레드를 공유하지 않는 별도 태스크에서 돈다.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MatchConfig;
use crate::core::{ClearReason, EntryQueue, EntryQueueJob, MatchStatus, StatusEntry, StatusRegistry};
use crate::error::MatchResult;
use crate::store::{keys, Store};
use crate::trace::{TraceEvent, TraceHub, TraceKind};

const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlOutcome {
    /// lease 키가 아니거나 레지스트리에 없는 유저
    Ignored,
    TimedOut,
    Renewed,
    Removed,
}

pub struct TtlHandler {
    registry:  StatusRegistry,
    queue:     EntryQueue,
    trace_hub: Arc<TraceHub>,
    config:    MatchConfig,
}

impl TtlHandler {
    pub fn new(registry: StatusRegistry, queue: EntryQueue, trace_hub: Arc<TraceHub>, config: MatchConfig) -> Self {
        Self { registry, queue, trace_hub, config }
    }

    pub async fn on_lease_expired(&self, key: &str) -> MatchResult<TtlOutcome> {
        let Some(user_id) = keys::user_from_lease(key) else {
            return Ok(TtlOutcome::Ignored);
        };

        for _ in 0..MAX_ATTEMPTS {
            let Some(entry) = self.registry.get_user_data(user_id).await? else {
                info!("[ttl] lease expired for unknown user={} (already cleaned up)", user_id);
                return Ok(TtlOutcome::Ignored);
            };
            if let Some(outcome) = self.apply(&entry).await? {
                return Ok(outcome);
            }
            debug!("[ttl] user={} changed while handling expiry, re-reading", user_id);
        }

        warn!("[ttl] user={} kept changing, expiry skipped", user_id);
        Ok(TtlOutcome::Ignored)
    }

    /// 전이 경합에서 졌으면 None
    async fn apply(&self, entry: &StatusEntry) -> MatchResult<Option<TtlOutcome>> {
        let user_id = entry.user_id.as_str();
        match entry.status {
            MatchStatus::Waiting => {
                if !self.registry
                    .transition(user_id, entry.session_key, MatchStatus::Waiting, MatchStatus::Timeout)
                    .await?
                {
                    return Ok(None);
                }
                let job = EntryQueueJob::clear_user(entry.with_status(MatchStatus::Timeout), ClearReason::Timeout);
                self.queue.enqueue(&job).await?;
                self.registry.set_lease(user_id, self.config.grace_lease).await?;

                self.trace_hub.publish(TraceEvent::new(
                    TraceKind::Timeout, &[user_id], format!("no partner within {:?}", self.config.match_timeout),
                ));
                info!("[ttl] user={} waiting → timeout", user_id);
                Ok(Some(TtlOutcome::TimedOut))
            }
            MatchStatus::Matching => {
                self.registry.set_lease(user_id, self.config.matching_renew).await?;
                debug!("[ttl] user={} still matching, lease renewed", user_id);
                Ok(Some(TtlOutcome::Renewed))
            }
            MatchStatus::Matched
            | MatchStatus::Timeout
            | MatchStatus::Cancelled
            | MatchStatus::Disconnected => {
                if !self.registry.remove_if_unchanged(entry).await? {
                    return Ok(None);
                }
                self.trace_hub.publish(TraceEvent::new(
                    TraceKind::Removed, &[user_id], format!("final cleanup from {}", entry.status),
                ));
                info!("[ttl] user={} removed (was {})", user_id, entry.status);
                Ok(Some(TtlOutcome::Removed))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// [루프] 만료 알림 리스너
// ----------------------------------------------------------------------------

pub async fn run_ttl_listener(handler: Arc<TtlHandler>, store: Store, mut shutdown: watch::Receiver<bool>) {
    let mut expired = match store.subscribe_expired().await {
        Ok(rx) => rx,
        Err(e) => {
            error!("[ttl] subscribe failed, lease expiry disabled: {}", e);
            return;
        }
    };

    info!("[ttl] Listener started");

    loop {
        tokio::select! {
            key = expired.recv() => {
                let Some(key) = key else {
                    warn!("[ttl] expiry stream closed");
                    break;
                };
                if let Err(e) = handler.on_lease_expired(&key).await {
                    warn!("[ttl] handling {} failed: {}", key, e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("[ttl] Listener stopped");
}
