// author: kodeholic (powered by Claude)
// MatchingWorker - EntryQueue 단일 소비자
//
// job 은 도착 순서대로 한 번에 하나씩 처리한다. 풀/레지스트리에 대한 다중 writer 경합을
// 순차 판단으로 바꾸는 것이 이 루프의 역할이다.
//
// match_user(userId, sessionKey):
//   1. 레지스트리 엔트리 없음 / sessionKey 불일치 / waiting 아님 → stale, 폐기
//   2. 같은 {userId, sessionKey} 가 FCFS 에 이미 있으면 중복 요청 → 폐기
//      (이전 sessionKey 의 FCFS 잔재는 제거)
//   3. 요청자를 waiting → matching 으로 전이 (sweeper / TTL 이 건드리지 않도록)
//   4. 요청 토픽 순서대로 (difficulty, topic) 버킷 head 를 확인
//        - head 의 sessionKey 가 레지스트리와 같고 waiting 이면 후보
//        - 아니면 stale head - 그 버킷에서 제거하고 다음 head
//   5. 후보 있음 → 요청자 matching → matched, 후보 waiting → matched (공용 matchingId)
//        - 요청자 전이 실패 (판단 중 cancel 등) → stale
//        - 후보 전이 실패 → 요청자 되돌리고 다음 후보
//      후보 없음 → 요청 토픽 버킷 전부 + FCFS 에 삽입, matching → waiting
//        - 전이 실패 → 방금 넣은 항목 회수, stale
//
// 모든 상태 기록은 읽은 (sessionKey, status) 가 그대로일 때만 적용된다.
//
// clear_user(userId, sessionKey, snapshot):
//   레지스트리 sessionKey 가 같을 때만 snapshot 기준으로 풀/FCFS 에서 제거하고
//   reason 에 맞는 상태로 기록. matched 로 넘어간 유저는 건드리지 않는다.
//   sessionKey 가 이미 바뀌었거나 엔트리가 없으면 snapshot 항목만 지운다.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::MatchConfig;
use crate::core::{
    ClearReason, EntryQueue, EntryQueueJob, MatchStatus, MatchingPool, PoolEntry,
    StatusEntry, StatusRegistry,
};
use crate::error::MatchResult;
use crate::matching::announcer::{MatchAnnouncer, MatchedEvent};
use crate::trace::{TraceEvent, TraceHub, TraceKind};
use crate::utils::current_timestamp;

/// job 하나의 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// 후보 없음 - 풀에 삽입
    Queued,
    Matched { matching_id: String, partner: String },
    Cleared,
    /// sessionKey 불일치 / 이미 정리됨 / 중복
    Stale,
    /// 저장소 장애 - 큐 tail 로 되돌림
    Requeued,
    /// 복구 불가 - 로그 후 폐기
    Dropped,
}

enum PairAttempt {
    Paired(JobOutcome),
    /// 요청자가 판단 중 다른 상태로 넘어감
    RequesterGone,
    /// 후보가 먼저 다른 상태로 넘어감 - 다음 후보로
    CandidateGone,
}

pub struct MatchingWorker {
    registry:  StatusRegistry,
    queue:     EntryQueue,
    pool:      MatchingPool,
    announcer: Arc<MatchAnnouncer>,
    trace_hub: Arc<TraceHub>,
    config:    MatchConfig,
}

impl MatchingWorker {
    pub fn new(
        registry:  StatusRegistry,
        queue:     EntryQueue,
        pool:      MatchingPool,
        announcer: Arc<MatchAnnouncer>,
        trace_hub: Arc<TraceHub>,
        config:    MatchConfig,
    ) -> Self {
        Self { registry, queue, pool, announcer, trace_hub, config }
    }

    /// 큐에서 job 1건을 꺼내 처리. 큐가 비었으면 None
    pub async fn poll_once(&self) -> MatchResult<Option<JobOutcome>> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        let outcome = match self.process(&job).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                warn!("[worker] {} user={} failed, requeue: {}", job.kind(), job.user_id(), e);
                if let Err(e) = self.queue.enqueue(&job).await {
                    error!("[worker] requeue failed, job lost user={}: {}", job.user_id(), e);
                }
                JobOutcome::Requeued
            }
            Err(e) => {
                error!("[worker] {} user={} dropped: {}", job.kind(), job.user_id(), e);
                JobOutcome::Dropped
            }
        };
        Ok(Some(outcome))
    }

    /// 큐가 빌 때까지 처리 (테스트/관리용)
    pub async fn drain(&self) -> MatchResult<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.poll_once().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub async fn process(&self, job: &EntryQueueJob) -> MatchResult<JobOutcome> {
        match job {
            EntryQueueJob::MatchUser { user_id, session_key } =>
                self.handle_match_user(user_id, *session_key).await,
            EntryQueueJob::ClearUser { user_id, session_key, reason, snapshot } =>
                self.handle_clear_user(user_id, *session_key, *reason, snapshot).await,
        }
    }

    // ------------------------------------------------------------------------
    // match_user
    // ------------------------------------------------------------------------

    async fn handle_match_user(&self, user_id: &str, session_key: i64) -> MatchResult<JobOutcome> {
        let entry = match self.registry.get_user_data(user_id).await? {
            Some(e) if e.session_key == session_key && e.status == MatchStatus::Waiting => e,
            Some(e) => {
                debug!("[worker] stale match_user user={} job_key={} live_key={} status={}",
                    user_id, session_key, e.session_key, e.status);
                return Ok(JobOutcome::Stale);
            }
            None => {
                debug!("[worker] match_user for unknown user={}", user_id);
                return Ok(JobOutcome::Stale);
            }
        };

        let me = PoolEntry::of(&entry);
        if self.pool.fcfs_contains(&me).await? {
            debug!("[worker] duplicate match_user user={} (already pooled)", user_id);
            return Ok(JobOutcome::Stale);
        }
        // 정리되지 못한 이전 요청의 FCFS 잔재. 버킷 쪽은 stale head 로 지연 정리된다
        self.pool.purge_fcfs_user(&me).await?;

        if !self.registry.transition(user_id, session_key, MatchStatus::Waiting, MatchStatus::Matching).await? {
            debug!("[worker] user={} left waiting before decision", user_id);
            return Ok(JobOutcome::Stale);
        }

        match self.decide(&entry).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // 다음 시도 때 다시 waiting 으로 읽히도록 복원. 그 사이 cancel 됐으면 그대로 둔다
                if let Err(restore) = self.registry
                    .transition(user_id, session_key, MatchStatus::Matching, MatchStatus::Waiting)
                    .await
                {
                    warn!("[worker] restore waiting failed user={}: {}", user_id, restore);
                }
                Err(e)
            }
        }
    }

    async fn decide(&self, entry: &StatusEntry) -> MatchResult<JobOutcome> {
        while let Some((candidate, topic)) = self.find_candidate(entry).await? {
            match self.pair(entry, &candidate, &topic).await? {
                PairAttempt::Paired(outcome) => return Ok(outcome),
                PairAttempt::RequesterGone   => return Ok(JobOutcome::Stale),
                PairAttempt::CandidateGone   => {
                    self.pool.drop_from_bucket(entry.difficulty, &topic, &PoolEntry::of(&candidate)).await?;
                }
            }
        }

        let pe = PoolEntry::of(entry);
        self.pool.enqueue_user(&pe, entry.difficulty, &entry.topics).await?;
        self.pool.push_fcfs(&pe).await?;

        if !self.registry
            .transition(&entry.user_id, entry.session_key, MatchStatus::Matching, MatchStatus::Waiting)
            .await?
        {
            // 판단 중 cancel 등 - 방금 넣은 항목 회수
            debug!("[worker] requester user={} moved on during decision", entry.user_id);
            self.pool.remove_user(&pe, entry.difficulty, &entry.topics).await?;
            return Ok(JobOutcome::Stale);
        }

        info!("[worker] queued user={} difficulty={} topics={:?}",
            entry.user_id, entry.difficulty, entry.topics);
        Ok(JobOutcome::Queued)
    }

    /// 요청 토픽 순서대로 첫 번째 유효 후보. stale head 는 지연 정리
    async fn find_candidate(&self, entry: &StatusEntry) -> MatchResult<Option<(StatusEntry, String)>> {
        for topic in &entry.topics {
            while let Some(head) = self.pool.peek(entry.difficulty, topic).await? {
                if head.user_id != entry.user_id {
                    if let Some(candidate) = self.registry.get_user_data(&head.user_id).await? {
                        if candidate.session_key == head.session_key && candidate.status == MatchStatus::Waiting {
                            trace!("[worker] candidate user={} bucket={}:{}", candidate.user_id, entry.difficulty, topic);
                            return Ok(Some((candidate, topic.clone())));
                        }
                    }
                }
                debug!("[worker] dropping stale head user={} key={} bucket={}:{}",
                    head.user_id, head.session_key, entry.difficulty, topic);
                self.pool.drop_from_bucket(entry.difficulty, topic, &head).await?;
            }
        }
        Ok(None)
    }

    async fn pair(&self, requester: &StatusEntry, candidate: &StatusEntry, topic: &str) -> MatchResult<PairAttempt> {
        let matching_id = uuid::Uuid::new_v4().to_string();

        // 상태부터 기록 - 풀 정리가 실패해도 남은 항목은 stale head 로 지연 정리된다
        if !self.registry
            .transition_matched(&requester.user_id, requester.session_key, MatchStatus::Matching, &matching_id)
            .await?
        {
            debug!("[worker] requester user={} moved on during decision", requester.user_id);
            return Ok(PairAttempt::RequesterGone);
        }

        let candidate_taken = match self.registry
            .transition_matched(&candidate.user_id, candidate.session_key, MatchStatus::Waiting, &matching_id)
            .await
        {
            Ok(taken) => taken,
            Err(e) => {
                if let Err(restore) = self.registry
                    .revert_matched(&requester.user_id, requester.session_key, &matching_id, MatchStatus::Matching)
                    .await
                {
                    warn!("[worker] rollback failed user={}: {}", requester.user_id, restore);
                }
                return Err(e);
            }
        };

        if !candidate_taken {
            debug!("[worker] candidate user={} moved on, trying next", candidate.user_id);
            let reverted = self.registry
                .revert_matched(&requester.user_id, requester.session_key, &matching_id, MatchStatus::Matching)
                .await?;
            return Ok(if reverted { PairAttempt::CandidateGone } else { PairAttempt::RequesterGone });
        }

        for user in [requester, candidate] {
            if let Err(e) = self.pool.remove_user(&PoolEntry::of(user), user.difficulty, &user.topics).await {
                warn!("[worker] pool cleanup deferred user={}: {}", user.user_id, e);
            }
            if let Err(e) = self.registry.set_lease(&user.user_id, self.config.matched_lease).await {
                warn!("[worker] matched lease not set user={}: {}", user.user_id, e);
            }
        }

        let event = MatchedEvent {
            matching_id: matching_id.clone(),
            difficulty:  requester.difficulty,
            topic:       topic.to_string(),
            users:       [candidate.user_id.clone(), requester.user_id.clone()],
            matched_at:  current_timestamp(),
        };
        self.announcer.announce(&event).await;

        self.trace_hub.publish(
            TraceEvent::new(
                TraceKind::Matched,
                &[candidate.user_id.as_str(), requester.user_id.as_str()],
                format!("{} / {}", requester.difficulty, topic),
            )
            .with_matching_id(&matching_id),
        );

        info!("[worker] matched {} + {} id={} bucket={}:{}",
            candidate.user_id, requester.user_id, matching_id, requester.difficulty, topic);
        Ok(PairAttempt::Paired(JobOutcome::Matched { matching_id, partner: candidate.user_id.clone() }))
    }

    // ------------------------------------------------------------------------
    // clear_user
    // ------------------------------------------------------------------------

    async fn handle_clear_user(
        &self,
        user_id:     &str,
        session_key: i64,
        reason:      ClearReason,
        snapshot:    &StatusEntry,
    ) -> MatchResult<JobOutcome> {
        let live = match self.registry.get_user_data(user_id).await? {
            Some(e) if e.session_key == session_key => e,
            _ => {
                // 이 sessionKey 는 더 이상 현재 요청이 아니므로 스냅샷 항목은 지워도 된다
                self.pool.remove_user(&PoolEntry::of(snapshot), snapshot.difficulty, &snapshot.topics).await?;
                debug!("[worker] stale clear_user user={} key={} reason={:?}", user_id, session_key, reason);
                return Ok(JobOutcome::Stale);
            }
        };

        if live.status == MatchStatus::Matched {
            debug!("[worker] clear_user skipped, user={} already matched", user_id);
            return Ok(JobOutcome::Stale);
        }

        self.pool.remove_user(&PoolEntry::of(snapshot), snapshot.difficulty, &snapshot.topics).await?;

        let status = match reason {
            ClearReason::Cancel     => MatchStatus::Cancelled,
            ClearReason::Timeout    => MatchStatus::Timeout,
            ClearReason::Disconnect => MatchStatus::Disconnected,
        };
        if live.status != status
            && !self.registry.transition(user_id, session_key, live.status, status).await?
        {
            debug!("[worker] clear_user user={} status changed meanwhile, left as is", user_id);
        }

        info!("[worker] cleared user={} reason={:?}", user_id, reason);
        Ok(JobOutcome::Cleared)
    }
}

// ----------------------------------------------------------------------------
// [루프] 단일 소비자 - 프로세스당 1개만 spawn
// ----------------------------------------------------------------------------

pub async fn run_matching_worker(worker: Arc<MatchingWorker>, mut shutdown: watch::Receiver<bool>) {
    let idle = worker.config.worker_idle_poll;
    info!("[worker] Started (idle_poll={:?})", idle);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match worker.poll_once().await {
            Ok(Some(_)) => continue,
            Ok(None)    => idle,
            Err(e) => {
                // dequeue 자체 실패 - 다음 poll 에 맡긴다
                warn!("[worker] dequeue failed: {}", e);
                idle.max(Duration::from_millis(200))
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("[worker] Stopped");
}
