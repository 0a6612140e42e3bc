// author: kodeholic (powered by Claude)
//
// 공유 상태 저장소 - 매칭 상태 전부가 여기에 산다
//
// 구조:
//   StatusRegistry / EntryQueue / MatchingPool / StoreBus
//       └── Store (호출 1회마다 timeout 적용)
//               └── dyn SharedStore
//                       ├── MemoryStore (기본, 프로세스 로컬)
//                       └── RedisStore  (feature = "redis-store")
//
// 개별 프리미티브(hash set/get, list push/pop)는 원자적이라고 가정한다.
// 상태 전이는 hash_compare_and_set 으로 한다 - 읽은 뒤 다른 actor 가 바꿨으면 쓰지 않는다.
// 여러 키에 걸친 연산(토픽 fan-out 등)은 원자적이지 않다 - 호출자가 부분 실패를 감내한다.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis_store;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{MatchError, MatchResult};

pub use memory::MemoryStore;

/// 만료된 lease 키 이름 스트림
pub type ExpiredRx = mpsc::UnboundedReceiver<String>;

// ----------------------------------------------------------------------------
// [키 레이아웃]
// ----------------------------------------------------------------------------

pub mod keys {
    pub const STATUS_PREFIX:  &str = "match:status:";
    pub const LEASE_PREFIX:   &str = "match:lease:";
    pub const POOL_PREFIX:    &str = "match:pool:";
    pub const SESSION_KEY:    &str = "match:session-key";
    pub const ENTRY_QUEUE:    &str = "match:entry-queue";
    pub const FCFS:           &str = "match:fcfs";
    pub const MATCHED_EVENTS: &str = "match:events:matched";
    /// 한 번이라도 쓰인 버킷 키 목록 (admin 풀 조회용 hash)
    pub const BUCKET_INDEX:   &str = "match:buckets";

    pub fn status(user_id: &str) -> String {
        format!("{}{}", STATUS_PREFIX, user_id)
    }

    pub fn lease(user_id: &str) -> String {
        format!("{}{}", LEASE_PREFIX, user_id)
    }

    /// 매칭 버킷 (difficulty, topic) 하나당 큐 1개
    pub fn pool(difficulty: &str, topic: &str) -> String {
        format!("{}{}:{}", POOL_PREFIX, difficulty, topic)
    }

    /// "match:lease:{user_id}" → user_id
    pub fn user_from_lease(key: &str) -> Option<&str> {
        key.strip_prefix(LEASE_PREFIX).filter(|u| !u.is_empty())
    }

    pub fn user_from_status(key: &str) -> Option<&str> {
        key.strip_prefix(STATUS_PREFIX).filter(|u| !u.is_empty())
    }
}

// ----------------------------------------------------------------------------
// [SharedStore] 백엔드가 구현하는 프리미티브
// ----------------------------------------------------------------------------

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn hash_get_all(&self, key: &str) -> MatchResult<HashMap<String, String>>;

    /// 필드 upsert
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> MatchResult<()>;

    /// 키가 없을 때만 기록. 기록했으면 true
    async fn hash_create(&self, key: &str, fields: &[(String, String)]) -> MatchResult<bool>;

    /// expect 의 필드가 전부 현재 값과 같을 때만 fields 를 upsert. 키가 없으면 false
    async fn hash_compare_and_set(
        &self,
        key:    &str,
        expect: &[(String, String)],
        fields: &[(String, String)],
    ) -> MatchResult<bool>;

    /// expect 의 필드가 전부 현재 값과 같을 때만 hash 삭제
    async fn hash_compare_and_delete(&self, key: &str, expect: &[(String, String)]) -> MatchResult<bool>;

    /// hash / list 키 삭제. 존재했으면 true
    async fn delete(&self, key: &str) -> MatchResult<bool>;

    async fn list_push(&self, key: &str, value: &str) -> MatchResult<usize>;
    async fn list_pop(&self, key: &str) -> MatchResult<Option<String>>;
    async fn list_peek(&self, key: &str) -> MatchResult<Option<String>>;

    /// value 와 일치하는 모든 항목 제거. 없으면 0 (에러 아님)
    async fn list_remove(&self, key: &str, value: &str) -> MatchResult<usize>;
    async fn list_range(&self, key: &str) -> MatchResult<Vec<String>>;
    async fn list_len(&self, key: &str) -> MatchResult<usize>;

    async fn incr(&self, key: &str) -> MatchResult<i64>;

    async fn set_lease(&self, key: &str, ttl: Duration) -> MatchResult<()>;
    async fn lease_remaining(&self, key: &str) -> MatchResult<Option<Duration>>;
    async fn clear_lease(&self, key: &str) -> MatchResult<()>;

    /// prefix 로 시작하는 hash 키 목록
    async fn scan_prefix(&self, prefix: &str) -> MatchResult<Vec<String>>;

    /// lease 만료 알림 구독 - 호출할 때마다 독립된 수신자
    async fn subscribe_expired(&self) -> MatchResult<ExpiredRx>;
}

// ----------------------------------------------------------------------------
// [Store] 모든 호출에 상한 시간을 거는 파사드
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct Store {
    inner:        Arc<dyn SharedStore>,
    call_timeout: Duration,
}

impl Store {
    pub fn new(inner: Arc<dyn SharedStore>, call_timeout: Duration) -> Self {
        Self { inner, call_timeout }
    }

    async fn timed<T, F>(&self, op: &'static str, key: &str, fut: F) -> MatchResult<T>
    where
        F: Future<Output = MatchResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[store] {} timed out after {:?} key={}", op, self.call_timeout, key);
                Err(MatchError::StoreTimeout(format!("{} {}", op, key)))
            }
        }
    }

    pub async fn hash_get_all(&self, key: &str) -> MatchResult<HashMap<String, String>> {
        self.timed("hgetall", key, self.inner.hash_get_all(key)).await
    }

    pub async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> MatchResult<()> {
        self.timed("hset", key, self.inner.hash_set(key, fields)).await
    }

    pub async fn hash_create(&self, key: &str, fields: &[(String, String)]) -> MatchResult<bool> {
        self.timed("hcreate", key, self.inner.hash_create(key, fields)).await
    }

    pub async fn hash_compare_and_set(
        &self,
        key:    &str,
        expect: &[(String, String)],
        fields: &[(String, String)],
    ) -> MatchResult<bool> {
        self.timed("hcas", key, self.inner.hash_compare_and_set(key, expect, fields)).await
    }

    pub async fn hash_compare_and_delete(&self, key: &str, expect: &[(String, String)]) -> MatchResult<bool> {
        self.timed("hcad", key, self.inner.hash_compare_and_delete(key, expect)).await
    }

    pub async fn delete(&self, key: &str) -> MatchResult<bool> {
        self.timed("del", key, self.inner.delete(key)).await
    }

    pub async fn list_push(&self, key: &str, value: &str) -> MatchResult<usize> {
        self.timed("rpush", key, self.inner.list_push(key, value)).await
    }

    pub async fn list_pop(&self, key: &str) -> MatchResult<Option<String>> {
        self.timed("lpop", key, self.inner.list_pop(key)).await
    }

    pub async fn list_peek(&self, key: &str) -> MatchResult<Option<String>> {
        self.timed("lindex", key, self.inner.list_peek(key)).await
    }

    pub async fn list_remove(&self, key: &str, value: &str) -> MatchResult<usize> {
        self.timed("lrem", key, self.inner.list_remove(key, value)).await
    }

    pub async fn list_range(&self, key: &str) -> MatchResult<Vec<String>> {
        self.timed("lrange", key, self.inner.list_range(key)).await
    }

    pub async fn list_len(&self, key: &str) -> MatchResult<usize> {
        self.timed("llen", key, self.inner.list_len(key)).await
    }

    pub async fn incr(&self, key: &str) -> MatchResult<i64> {
        self.timed("incr", key, self.inner.incr(key)).await
    }

    pub async fn set_lease(&self, key: &str, ttl: Duration) -> MatchResult<()> {
        self.timed("set_lease", key, self.inner.set_lease(key, ttl)).await
    }

    pub async fn lease_remaining(&self, key: &str) -> MatchResult<Option<Duration>> {
        self.timed("pttl", key, self.inner.lease_remaining(key)).await
    }

    pub async fn clear_lease(&self, key: &str) -> MatchResult<()> {
        self.timed("clear_lease", key, self.inner.clear_lease(key)).await
    }

    pub async fn scan_prefix(&self, prefix: &str) -> MatchResult<Vec<String>> {
        self.timed("scan", prefix, self.inner.scan_prefix(prefix)).await
    }

    pub async fn subscribe_expired(&self) -> MatchResult<ExpiredRx> {
        self.timed("subscribe", "expired", self.inner.subscribe_expired()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 모든 호출이 멈춰버리는 백엔드 - timeout 경로 검증용
    struct HangingStore;

    #[async_trait]
    impl SharedStore for HangingStore {
        async fn hash_get_all(&self, _: &str) -> MatchResult<HashMap<String, String>> {
            futures_util::future::pending().await
        }
        async fn hash_set(&self, _: &str, _: &[(String, String)]) -> MatchResult<()> { Ok(()) }
        async fn hash_create(&self, _: &str, _: &[(String, String)]) -> MatchResult<bool> { Ok(true) }
        async fn hash_compare_and_set(
            &self, _: &str, _: &[(String, String)], _: &[(String, String)],
        ) -> MatchResult<bool> {
            futures_util::future::pending().await
        }
        async fn hash_compare_and_delete(&self, _: &str, _: &[(String, String)]) -> MatchResult<bool> { Ok(false) }
        async fn delete(&self, _: &str) -> MatchResult<bool> { Ok(false) }
        async fn list_push(&self, _: &str, _: &str) -> MatchResult<usize> { Ok(0) }
        async fn list_pop(&self, _: &str) -> MatchResult<Option<String>> {
            futures_util::future::pending().await
        }
        async fn list_peek(&self, _: &str) -> MatchResult<Option<String>> { Ok(None) }
        async fn list_remove(&self, _: &str, _: &str) -> MatchResult<usize> { Ok(0) }
        async fn list_range(&self, _: &str) -> MatchResult<Vec<String>> { Ok(vec![]) }
        async fn list_len(&self, _: &str) -> MatchResult<usize> { Ok(0) }
        async fn incr(&self, _: &str) -> MatchResult<i64> { Ok(1) }
        async fn set_lease(&self, _: &str, _: Duration) -> MatchResult<()> { Ok(()) }
        async fn lease_remaining(&self, _: &str) -> MatchResult<Option<Duration>> { Ok(None) }
        async fn clear_lease(&self, _: &str) -> MatchResult<()> { Ok(()) }
        async fn scan_prefix(&self, _: &str) -> MatchResult<Vec<String>> { Ok(vec![]) }
        async fn subscribe_expired(&self) -> MatchResult<ExpiredRx> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn hanging_call_becomes_store_timeout() {
        let store = Store::new(Arc::new(HangingStore), Duration::from_millis(20));
        let err = store.hash_get_all("match:status:alice").await.unwrap_err();
        assert!(matches!(err, MatchError::StoreTimeout(_)));
        assert!(err.is_transient());

        let err = store.list_pop(keys::ENTRY_QUEUE).await.unwrap_err();
        assert!(matches!(err, MatchError::StoreTimeout(_)));

        let err = store.hash_compare_and_set("match:status:alice", &[], &[]).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn key_helpers_round_trip_user_ids() {
        assert_eq!(keys::user_from_lease(&keys::lease("alice")), Some("alice"));
        assert_eq!(keys::user_from_status(&keys::status("bob")), Some("bob"));
        assert_eq!(keys::user_from_lease("match:status:alice"), None);
        assert_eq!(keys::user_from_lease(keys::LEASE_PREFIX), None);
        assert_eq!(keys::pool("Easy", "DP"), "match:pool:Easy:DP");
    }
}
