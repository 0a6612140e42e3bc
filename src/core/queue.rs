// author: kodeholic (powered by Claude)
// EntryQueue - 매칭 워커 입력 큐 (FIFO, 공유 저장소 list)
//
// job 은 JSON 으로 직렬화된다:
//   { "type": "match_user", "userId": "alice", "sessionKey": 7 }
//   { "type": "clear_user", "userId": "alice", "sessionKey": 7, "reason": "cancel", "snapshot": {...} }

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::core::status::StatusEntry;
use crate::error::MatchResult;
use crate::store::{keys, Store};

/// clear_user 를 만든 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearReason {
    Cancel,
    Timeout,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryQueueJob {
    #[serde(rename_all = "camelCase")]
    MatchUser {
        user_id:     String,
        session_key: i64,
    },
    /// snapshot: 생성 시점의 StatusEntry (풀에서 어느 버킷을 지울지 알려준다)
    #[serde(rename_all = "camelCase")]
    ClearUser {
        user_id:     String,
        session_key: i64,
        reason:      ClearReason,
        snapshot:    StatusEntry,
    },
}

impl EntryQueueJob {
    pub fn match_user(user_id: &str, session_key: i64) -> Self {
        EntryQueueJob::MatchUser { user_id: user_id.to_string(), session_key }
    }

    pub fn clear_user(snapshot: StatusEntry, reason: ClearReason) -> Self {
        EntryQueueJob::ClearUser {
            user_id:     snapshot.user_id.clone(),
            session_key: snapshot.session_key,
            reason,
            snapshot,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EntryQueueJob::MatchUser { user_id, .. } | EntryQueueJob::ClearUser { user_id, .. } => user_id,
        }
    }

    pub fn session_key(&self) -> i64 {
        match self {
            EntryQueueJob::MatchUser { session_key, .. } | EntryQueueJob::ClearUser { session_key, .. } => *session_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EntryQueueJob::MatchUser { .. } => "match_user",
            EntryQueueJob::ClearUser { .. } => "clear_user",
        }
    }
}

#[derive(Clone)]
pub struct EntryQueue {
    store: Store,
}

impl EntryQueue {
    pub fn new(store: Store) -> Self {
        trace!("Initializing EntryQueue");
        Self { store }
    }

    pub async fn enqueue(&self, job: &EntryQueueJob) -> MatchResult<()> {
        let json = serde_json::to_string(job)?;
        let depth = self.store.list_push(keys::ENTRY_QUEUE, &json).await?;
        trace!("[queue] enqueued {} user={} depth={}", job.kind(), job.user_id(), depth);
        Ok(())
    }

    /// 큐가 비면 None. 해석 불가한 항목은 버리고 다음 항목으로 넘어간다
    pub async fn dequeue(&self) -> MatchResult<Option<EntryQueueJob>> {
        while let Some(raw) = self.store.list_pop(keys::ENTRY_QUEUE).await? {
            match serde_json::from_str::<EntryQueueJob>(&raw) {
                Ok(job) => return Ok(Some(job)),
                Err(e)  => warn!("[queue] dropping undecodable job: {} raw={}", e, raw),
            }
        }
        Ok(None)
    }

    pub async fn len(&self) -> MatchResult<usize> {
        self.store.list_len(keys::ENTRY_QUEUE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Difficulty;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue() -> (EntryQueue, Store) {
        let store = Store::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        (EntryQueue::new(store.clone()), store)
    }

    #[test]
    fn job_wire_format_is_tagged() {
        let json = serde_json::to_value(EntryQueueJob::match_user("alice", 3)).unwrap();
        assert_eq!(json["type"], "match_user");
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["sessionKey"], 3);

        let snapshot = StatusEntry::new("bob", 9, Difficulty::Hard, vec!["Graph".into()], 0);
        let json = serde_json::to_value(EntryQueueJob::clear_user(snapshot, ClearReason::Timeout)).unwrap();
        assert_eq!(json["type"], "clear_user");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["snapshot"]["topics"][0], "Graph");
    }

    #[tokio::test]
    async fn dequeue_is_fifo() {
        let (q, _) = queue();
        q.enqueue(&EntryQueueJob::match_user("a", 1)).await.unwrap();
        q.enqueue(&EntryQueueJob::match_user("b", 2)).await.unwrap();
        assert_eq!(q.len().await.unwrap(), 2);
        assert_eq!(q.dequeue().await.unwrap().unwrap().user_id(), "a");
        assert_eq!(q.dequeue().await.unwrap().unwrap().user_id(), "b");
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_entries_are_skipped() {
        let (q, store) = queue();
        store.list_push(keys::ENTRY_QUEUE, "not-json").await.unwrap();
        q.enqueue(&EntryQueueJob::match_user("a", 1)).await.unwrap();
        let job = q.dequeue().await.unwrap().unwrap();
        assert_eq!(job, EntryQueueJob::match_user("a", 1));
    }
}
