// author: kodeholic (powered by Claude)
// MatchingPool - (difficulty, topic) 버킷별 대기 큐 + 전역 FCFS 목록
//
// 같은 유저가 여러 토픽 버킷에 동시에 들어 있을 수 있다 (요청 토픽마다 1개).
// 버킷 항목은 {userId, sessionKey} 로 식별한다. sessionKey 가 레지스트리와 다른 항목은
// stale - 워커가 head 를 볼 때 지연 정리한다.
//
// FCFS 목록은 대기 순번 표시용이다. 매칭 판단에는 쓰지 않는다.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::status::{Difficulty, StatusEntry};
use crate::error::{MatchError, MatchResult};
use crate::store::{keys, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub user_id:     String,
    pub session_key: i64,
}

impl PoolEntry {
    pub fn of(entry: &StatusEntry) -> Self {
        Self { user_id: entry.user_id.clone(), session_key: entry.session_key }
    }

    /// list 값 - LREM 이 정확히 일치해야 하므로 필드 순서 고정 직렬화
    fn encode(&self) -> MatchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(raw: &str) -> MatchResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// admin 풀 조회 아이템
#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub difficulty: String,
    pub topic:      String,
    pub size:       usize,
}

#[derive(Clone)]
pub struct MatchingPool {
    store: Store,
}

impl MatchingPool {
    pub fn new(store: Store) -> Self {
        trace!("Initializing MatchingPool");
        Self { store }
    }

    /// 요청 토픽마다 버킷 tail 에 추가. 일부 버킷 실패는 로그만 남기고 계속 진행,
    /// 전부 실패했을 때만 에러. 성공한 버킷 수 반환
    pub async fn enqueue_user(&self, entry: &PoolEntry, difficulty: Difficulty, topics: &[String]) -> MatchResult<usize> {
        let value = entry.encode()?;
        let mut ok = 0;
        let mut last_err = None;

        for topic in topics {
            let key = keys::pool(difficulty.as_str(), topic);
            match self.store.list_push(&key, &value).await {
                Ok(_) => {
                    ok += 1;
                    self.index_bucket(difficulty, topic).await;
                }
                Err(e) => {
                    warn!("[pool] enqueue failed user={} bucket={}: {}", entry.user_id, key, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if ok == 0 => Err(e),
            _ => {
                trace!("[pool] enqueued user={} into {}/{} bucket(s)", entry.user_id, ok, topics.len());
                Ok(ok)
            }
        }
    }

    async fn index_bucket(&self, difficulty: Difficulty, topic: &str) {
        let field = format!("{}:{}", difficulty.as_str(), topic);
        if let Err(e) = self.store.hash_set(keys::BUCKET_INDEX, &[(field, "1".to_string())]).await {
            trace!("[pool] bucket index update skipped: {}", e);
        }
    }

    /// 모든 버킷 + FCFS 에서 제거. 없는 항목 제거는 에러 아님
    pub async fn remove_user(&self, entry: &PoolEntry, difficulty: Difficulty, topics: &[String]) -> MatchResult<()> {
        let value = entry.encode()?;
        for topic in topics {
            self.store.list_remove(&keys::pool(difficulty.as_str(), topic), &value).await?;
        }
        self.store.list_remove(keys::FCFS, &value).await?;
        trace!("[pool] removed user={} key={}", entry.user_id, entry.session_key);
        Ok(())
    }

    /// 버킷 head 조회 (제거하지 않음). 해석 불가한 head 는 버리고 다음을 본다
    pub async fn peek(&self, difficulty: Difficulty, topic: &str) -> MatchResult<Option<PoolEntry>> {
        let key = keys::pool(difficulty.as_str(), topic);
        while let Some(raw) = self.store.list_peek(&key).await? {
            match PoolEntry::decode(&raw) {
                Ok(entry) => return Ok(Some(entry)),
                Err(e) => {
                    warn!("[pool] dropping undecodable head bucket={}: {}", key, e);
                    self.store.list_remove(&key, &raw).await?;
                }
            }
        }
        Ok(None)
    }

    /// 버킷 하나에서만 제거 (stale head 정리용)
    pub async fn drop_from_bucket(&self, difficulty: Difficulty, topic: &str, entry: &PoolEntry) -> MatchResult<()> {
        self.store.list_remove(&keys::pool(difficulty.as_str(), topic), &entry.encode()?).await?;
        Ok(())
    }

    pub async fn bucket_entries(&self, difficulty: Difficulty, topic: &str) -> MatchResult<Vec<PoolEntry>> {
        let raw = self.store.list_range(&keys::pool(difficulty.as_str(), topic)).await?;
        Ok(raw.iter().filter_map(|r| PoolEntry::decode(r).ok()).collect())
    }

    // ------------------------------------------------------------------------
    // FCFS
    // ------------------------------------------------------------------------

    pub async fn push_fcfs(&self, entry: &PoolEntry) -> MatchResult<()> {
        self.store.list_push(keys::FCFS, &entry.encode()?).await?;
        Ok(())
    }

    pub async fn fcfs_entries(&self) -> MatchResult<Vec<PoolEntry>> {
        let raw = self.store.list_range(keys::FCFS).await?;
        Ok(raw.iter().filter_map(|r| PoolEntry::decode(r).ok()).collect())
    }

    /// {userId, sessionKey} 가 정확히 일치하는 항목이 있는지
    pub async fn fcfs_contains(&self, entry: &PoolEntry) -> MatchResult<bool> {
        Ok(self.fcfs_entries().await?.contains(entry))
    }

    /// 같은 유저의 이전 sessionKey 항목을 FCFS 에서 제거. 제거한 수 반환
    pub async fn purge_fcfs_user(&self, current: &PoolEntry) -> MatchResult<usize> {
        let mut removed = 0;
        for old in self.fcfs_entries().await? {
            if old.user_id == current.user_id && old.session_key != current.session_key {
                removed += self.store.list_remove(keys::FCFS, &old.encode()?).await?;
            }
        }
        if removed > 0 {
            debug!("[pool] purged {} leftover fcfs entr(ies) user={}", removed, current.user_id);
        }
        Ok(removed)
    }

    /// 1부터 시작하는 대기 순번. FCFS 에 없으면 None
    pub async fn queue_position(&self, user_id: &str) -> MatchResult<Option<usize>> {
        Ok(self.fcfs_entries().await?
            .iter()
            .position(|e| e.user_id == user_id)
            .map(|i| i + 1))
    }

    pub async fn fcfs_len(&self) -> MatchResult<usize> {
        self.store.list_len(keys::FCFS).await
    }

    /// 인덱스에 기록된 모든 버킷의 현재 크기
    pub async fn bucket_sizes(&self) -> MatchResult<Vec<BucketInfo>> {
        let index = self.store.hash_get_all(keys::BUCKET_INDEX).await?;
        let mut out = Vec::with_capacity(index.len());
        for field in index.keys() {
            let Some((difficulty, topic)) = field.split_once(':') else {
                return Err(MatchError::Codec(format!("bad bucket index field: {}", field)));
            };
            let size = self.store.list_len(&keys::pool(difficulty, topic)).await?;
            out.push(BucketInfo { difficulty: difficulty.to_string(), topic: topic.to_string(), size });
        }
        out.sort_by(|a, b| (&a.difficulty, &a.topic).cmp(&(&b.difficulty, &b.topic)));
        Ok(out)
    }
}
