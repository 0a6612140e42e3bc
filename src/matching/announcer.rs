// author: kodeholic (powered by Claude)
// MatchAnnouncer - 페어 성사 이벤트를 durable bus 에 발행
//
// 발행 실패는 로그만 남기고 매칭을 되돌리지 않는다.
// bus 는 at-least-once - 소비자(SessionManager)가 matchingId 기준으로 멱등 처리한다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, trace};

use crate::core::Difficulty;
use crate::error::MatchResult;
use crate::store::{keys, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    pub matching_id: String,
    pub difficulty:  Difficulty,
    pub topic:       String,
    pub users:       [String; 2],
    pub matched_at:  u64,
}

#[async_trait]
pub trait MatchBus: Send + Sync {
    async fn publish(&self, event: &MatchedEvent) -> MatchResult<()>;

    /// 다음 이벤트 1건. 없으면 None
    async fn consume(&self) -> MatchResult<Option<MatchedEvent>>;

    /// 처리 실패한 이벤트를 재전달 대상으로 되돌림
    async fn requeue(&self, event: &MatchedEvent) -> MatchResult<()>;
}

// ----------------------------------------------------------------------------
// [StoreBus] 공유 저장소 list 기반 bus
// ----------------------------------------------------------------------------

pub struct StoreBus {
    store: Store,
}

impl StoreBus {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn pending(&self) -> MatchResult<usize> {
        self.store.list_len(keys::MATCHED_EVENTS).await
    }
}

#[async_trait]
impl MatchBus for StoreBus {
    async fn publish(&self, event: &MatchedEvent) -> MatchResult<()> {
        let json = serde_json::to_string(event)?;
        self.store.list_push(keys::MATCHED_EVENTS, &json).await?;
        Ok(())
    }

    async fn consume(&self) -> MatchResult<Option<MatchedEvent>> {
        while let Some(raw) = self.store.list_pop(keys::MATCHED_EVENTS).await? {
            match serde_json::from_str(&raw) {
                Ok(event) => return Ok(Some(event)),
                Err(e)    => error!("[announcer] dropping undecodable event: {} raw={}", e, raw),
            }
        }
        Ok(None)
    }

    async fn requeue(&self, event: &MatchedEvent) -> MatchResult<()> {
        self.publish(event).await
    }
}

// ----------------------------------------------------------------------------
// [MatchAnnouncer]
// ----------------------------------------------------------------------------

pub struct MatchAnnouncer {
    bus: Arc<dyn MatchBus>,
}

impl MatchAnnouncer {
    pub fn new(bus: Arc<dyn MatchBus>) -> Self {
        trace!("Initializing MatchAnnouncer");
        Self { bus }
    }

    /// 발행 성공 여부 반환 - 실패해도 호출자는 매칭을 유지한다
    pub async fn announce(&self, event: &MatchedEvent) -> bool {
        match self.bus.publish(event).await {
            Ok(()) => {
                info!("[announcer] matched id={} users={}+{} topic={}",
                    event.matching_id, event.users[0], event.users[1], event.topic);
                true
            }
            Err(e) => {
                error!("[announcer] publish failed id={} (match kept): {}", event.matching_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn event(id: &str) -> MatchedEvent {
        MatchedEvent {
            matching_id: id.to_string(),
            difficulty:  Difficulty::Easy,
            topic:       "DP".to_string(),
            users:       ["alice".to_string(), "bob".to_string()],
            matched_at:  1,
        }
    }

    fn bus() -> StoreBus {
        StoreBus::new(Store::new(Arc::new(MemoryStore::new()), Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn events_are_consumed_in_order() {
        let bus = bus();
        bus.publish(&event("m-1")).await.unwrap();
        bus.publish(&event("m-2")).await.unwrap();
        assert_eq!(bus.pending().await.unwrap(), 2);
        assert_eq!(bus.consume().await.unwrap().unwrap().matching_id, "m-1");
        assert_eq!(bus.consume().await.unwrap().unwrap().matching_id, "m-2");
        assert!(bus.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requeued_event_is_redelivered() {
        let bus = bus();
        bus.publish(&event("m-1")).await.unwrap();
        let e = bus.consume().await.unwrap().unwrap();
        bus.requeue(&e).await.unwrap();
        assert_eq!(bus.consume().await.unwrap(), Some(e));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json = serde_json::to_value(event("m-1")).unwrap();
        assert_eq!(json["matchingId"], "m-1");
        assert_eq!(json["difficulty"], "Easy");
        assert_eq!(json["users"][1], "bob");
    }
}
