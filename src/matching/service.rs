// author: kodeholic (powered by Claude)
// MatchService - 공개 API 가 호출하는 매칭 요청/조회/취소
//
// 실제 페어링 판단은 하지 않는다. 레지스트리에 엔트리를 만들고 EntryQueue 에 job 을
// 넣는 것까지가 여기의 몫이고, 나머지는 워커가 순차 처리한다.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{self, MatchConfig};
use crate::core::{
    ClearReason, Difficulty, EntryQueue, EntryQueueJob, MatchStatus, MatchingPool, PoolEntry,
    StatusEntry, StatusRegistry,
};
use crate::error::{MatchError, MatchResult};
use crate::trace::{TraceEvent, TraceHub, TraceKind};
use crate::utils::{current_timestamp, normalize_topics};

const CANCEL_ATTEMPTS: usize = 3;

/// GET match/status 응답
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status:         MatchStatus,
    /// waiting / matching 일 때 남은 lease 초. 그 외 null
    pub remaining_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_id:    Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub session_key:    i64,
}

pub struct MatchService {
    registry:  StatusRegistry,
    queue:     EntryQueue,
    pool:      MatchingPool,
    trace_hub: Arc<TraceHub>,
    config:    MatchConfig,
}

impl MatchService {
    pub fn new(
        registry:  StatusRegistry,
        queue:     EntryQueue,
        pool:      MatchingPool,
        trace_hub: Arc<TraceHub>,
        config:    MatchConfig,
    ) -> Self {
        Self { registry, queue, pool, trace_hub, config }
    }

    /// 새 매칭 요청 수락. 발급된 sessionKey 반환
    pub async fn request_match(&self, user_id: &str, difficulty: &str, topics: &[String]) -> MatchResult<i64> {
        let difficulty = Difficulty::parse(difficulty)
            .ok_or_else(|| MatchError::InvalidRequest(format!("unknown difficulty: {}", difficulty)))?;
        let topics = normalize_topics(topics);
        if topics.is_empty() {
            return Err(MatchError::InvalidRequest("at least one topic is required".into()));
        }
        if topics.len() > config::MAX_TOPICS_PER_REQUEST {
            return Err(MatchError::InvalidRequest(format!(
                "too many topics: {} (max {})", topics.len(), config::MAX_TOPICS_PER_REQUEST,
            )));
        }

        // advisory 확인 - 최종 판정은 add_user 의 first-writer-wins
        if let Some(existing) = self.registry.get_user_data(user_id).await? {
            if existing.status.is_pending() {
                return Err(MatchError::AlreadyPending(user_id.to_string()));
            }
            // 유예 중인 이전 요청 잔재 정리 후 새 요청으로 교체
            self.pool.remove_user(&PoolEntry::of(&existing), existing.difficulty, &existing.topics).await?;
            // 그 사이 바뀌었으면 지우지 않는다 - 아래 add_user 가 충돌로 판정
            self.registry.remove_if_unchanged(&existing).await?;
        }

        let session_key = self.registry.next_session_key().await?;
        let entry = StatusEntry::new(user_id, session_key, difficulty, topics, current_timestamp());
        self.registry.add_user(&entry).await?;
        self.registry.set_lease(user_id, self.config.match_timeout).await?;

        if let Err(e) = self.queue.enqueue(&EntryQueueJob::match_user(user_id, session_key)).await {
            // 엔트리는 lease 만료 시 timeout 으로 정리된다
            warn!("[api] enqueue failed user={} key={}: {}", user_id, session_key, e);
            return Err(e);
        }

        self.trace_hub.publish(TraceEvent::new(
            TraceKind::Queued, &[user_id], format!("{} {:?}", entry.difficulty, entry.topics),
        ));
        info!("[api] match requested user={} key={} difficulty={} topics={:?}",
            user_id, session_key, entry.difficulty, entry.topics);
        Ok(session_key)
    }

    /// 상태 조회 - 조회 자체가 heartbeat 역할도 한다
    pub async fn status(&self, user_id: &str) -> MatchResult<StatusView> {
        let entry = self.registry.get_user_data(user_id).await?
            .ok_or_else(|| MatchError::NotFound(user_id.to_string()))?;

        if entry.status.is_cancellable() {
            self.registry.update_last_seen(user_id, current_timestamp()).await?;
        }

        let remaining_time = if entry.status.is_cancellable() {
            self.registry.get_lease_remaining(user_id).await?
                .map(|d| d.as_millis().div_ceil(1000) as u64)
        } else {
            None
        };

        let queue_position = if entry.status == MatchStatus::Waiting {
            self.pool.queue_position(user_id).await?
        } else {
            None
        };

        Ok(StatusView {
            status: entry.status,
            remaining_time,
            matching_id: entry.matching_id,
            queue_position,
            session_key: entry.session_key,
        })
    }

    pub async fn heartbeat(&self, user_id: &str) -> MatchResult<()> {
        if self.registry.get_user_data(user_id).await?.is_none() {
            return Err(MatchError::NotFound(user_id.to_string()));
        }
        self.registry.update_last_seen(user_id, current_timestamp()).await
    }

    /// waiting / matching 만 취소 가능
    pub async fn cancel(&self, user_id: &str) -> MatchResult<()> {
        let mut attempts = 0;
        let entry = loop {
            let entry = self.registry.get_user_data(user_id).await?
                .ok_or_else(|| MatchError::NotFound(user_id.to_string()))?;

            attempts += 1;
            if !entry.status.is_cancellable() || attempts > CANCEL_ATTEMPTS {
                return Err(MatchError::NotCancellable {
                    user_id: user_id.to_string(),
                    status:  entry.status.to_string(),
                });
            }

            // 워커가 waiting ↔ matching 을 바꾸는 중이면 다시 읽는다
            if self.registry.transition(user_id, entry.session_key, entry.status, MatchStatus::Cancelled).await? {
                break entry;
            }
        };

        let job = EntryQueueJob::clear_user(entry.with_status(MatchStatus::Cancelled), ClearReason::Cancel);
        self.queue.enqueue(&job).await?;
        self.registry.set_lease(user_id, self.config.grace_lease).await?;

        self.trace_hub.publish(TraceEvent::new(TraceKind::Cancelled, &[user_id], "cancelled by user"));
        info!("[api] match cancelled user={} key={}", user_id, entry.session_key);
        Ok(())
    }

    /// admin 강제 정리 - 상태와 무관하게 풀/레지스트리/lease 전부 즉시 제거
    pub async fn force_clear(&self, user_id: &str) -> MatchResult<StatusEntry> {
        let entry = self.registry.get_user_data(user_id).await?
            .ok_or_else(|| MatchError::NotFound(user_id.to_string()))?;

        self.pool.remove_user(&PoolEntry::of(&entry), entry.difficulty, &entry.topics).await?;
        self.registry.remove_user(user_id).await?;
        self.registry.clear_lease(user_id).await?;

        self.trace_hub.publish(TraceEvent::new(TraceKind::Removed, &[user_id], "cleared by admin"));
        info!("[api] admin cleared user={} (was {})", user_id, entry.status);
        Ok(entry)
    }
}
