// author: kodeholic (powered by Claude)
// 끊긴 대기 유저 정리 태스크 (Disconnect Sweeper)
//
// 주기마다 수행:
//   1. 전체 StatusEntry 스캔
//   2. waiting 이면서 lastSeen 이 임계값보다 오래된 유저 → disconnected
//   3. clear_user(disconnect) 발행 + 유예 lease (최종 삭제는 TTL 핸들러가)
//
// waiting 이 아닌 유저는 아무리 오래돼도 건드리지 않는다 (matching 중인 유저와 워커 경합 방지).
// 스캔은 스냅샷이다 - 기록 직전에 (sessionKey, waiting, lastSeen) 이 그대로인지 다시 확인하고,
// 그 사이 매칭됐거나 heartbeat 가 들어온 유저는 건너뛴다.
// 재진입 불가: 이전 스캔이 아직 돌고 있으면 이번 tick 은 통째로 건너뛴다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MatchConfig;
use crate::core::{ClearReason, EntryQueue, EntryQueueJob, MatchStatus, StatusEntry, StatusRegistry};
use crate::error::MatchResult;
use crate::trace::{TraceEvent, TraceHub, TraceKind};
use crate::utils::current_timestamp;

pub struct DisconnectSweeper {
    registry:    StatusRegistry,
    queue:       EntryQueue,
    trace_hub:   Arc<TraceHub>,
    config:      MatchConfig,
    in_progress: AtomicBool,
}

/// 스캔 종료 시 (에러 포함) 플래그 해제
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DisconnectSweeper {
    pub fn new(registry: StatusRegistry, queue: EntryQueue, trace_hub: Arc<TraceHub>, config: MatchConfig) -> Self {
        Self { registry, queue, trace_hub, config, in_progress: AtomicBool::new(false) }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// 스캔 1회. 다른 스캔이 진행 중이면 None, 아니면 disconnected 처리한 user_id 목록
    pub async fn sweep_once(&self) -> MatchResult<Option<Vec<String>>> {
        if self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[sweeper] previous sweep still running, tick skipped");
            return Ok(None);
        }
        let _guard = SweepGuard(&self.in_progress);

        let now       = current_timestamp();
        let threshold = self.config.disconnect_threshold.as_millis() as u64;
        let mut swept = Vec::new();

        for entry in self.registry.all_users().await? {
            if entry.status != MatchStatus::Waiting || now.saturating_sub(entry.last_seen) <= threshold {
                continue;
            }
            // 유저 하나의 실패가 나머지 스캔을 막지 않도록 개별 처리
            match self.disconnect(&entry, now).await {
                Ok(true)  => swept.push(entry.user_id.clone()),
                Ok(false) => debug!("[sweeper] user={} changed since scan, skipped", entry.user_id),
                Err(e)    => warn!("[sweeper] user={} disconnect failed: {}", entry.user_id, e),
            }
        }

        if !swept.is_empty() {
            info!("[sweeper] {} user(s) disconnected: {:?}", swept.len(), swept);
        }
        Ok(Some(swept))
    }

    /// 스캔 이후 상태가 바뀌었으면 false
    async fn disconnect(&self, entry: &StatusEntry, now: u64) -> MatchResult<bool> {
        if !self.registry.transition_if_unseen(entry, MatchStatus::Disconnected).await? {
            return Ok(false);
        }
        let job = EntryQueueJob::clear_user(entry.with_status(MatchStatus::Disconnected), ClearReason::Disconnect);
        self.queue.enqueue(&job).await?;
        self.registry.set_lease(&entry.user_id, self.config.grace_lease).await?;

        self.trace_hub.publish(TraceEvent::new(
            TraceKind::Disconnected,
            &[entry.user_id.as_str()],
            format!("no heartbeat for {}ms", now.saturating_sub(entry.last_seen)),
        ));
        Ok(true)
    }
}

pub async fn run_disconnect_sweeper(sweeper: Arc<DisconnectSweeper>, mut shutdown: watch::Receiver<bool>) {
    let interval  = sweeper.config.sweeper_interval;
    let mut timer = tokio::time::interval(interval);
    // 스캔이 주기보다 길어지면 밀린 tick 은 버린다
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer.tick().await; // 첫 틱 skip (startup 시 즉시 실행 방지)

    info!("[sweeper] Started (interval={:?}, threshold={:?})", interval, sweeper.config.disconnect_threshold);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                // 인라인 실행 - shutdown 시 진행 중 스캔이 끝난 뒤에 루프가 종료된다
                if let Err(e) = sweeper.sweep_once().await {
                    warn!("[sweeper] sweep aborted: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("[sweeper] Stopped");
}
