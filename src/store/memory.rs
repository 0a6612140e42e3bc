// author: kodeholic (powered by Claude)
// MemoryStore - 프로세스 로컬 공유 저장소
//
// hash / list / counter / lease 를 각각 별도 락으로 보호한다.
// lease 만료는 run_expiry_ticker 가 주기적으로 스캔해서 구독자들에게 키 이름을 뿌린다
// (Redis 의 keyspace expired 알림과 같은 의미).

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{info, trace};

use crate::error::MatchResult;

use super::{ExpiredRx, SharedStore};

pub struct MemoryStore {
    hashes:      RwLock<HashMap<String, HashMap<String, String>>>,
    lists:       Mutex<HashMap<String, VecDeque<String>>>,
    counters:    Mutex<HashMap<String, i64>>,
    leases:      Mutex<HashMap<String, Instant>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        trace!("Initializing MemoryStore");
        Self {
            hashes:      RwLock::new(HashMap::new()),
            lists:       Mutex::new(HashMap::new()),
            counters:    Mutex::new(HashMap::new()),
            leases:      Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// 기한이 지난 lease 를 제거하고 구독자에게 알린다. 만료된 키 목록 반환
    pub fn expire_due(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut leases = self.leases.lock().unwrap();
            let keys: Vec<String> = leases.iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for k in &keys {
                leases.remove(k);
            }
            keys
        };

        if !expired.is_empty() {
            let mut subs = self.subscribers.lock().unwrap();
            // 수신자가 닫힌 구독은 정리
            subs.retain(|tx| expired.iter().all(|k| tx.send(k.clone()).is_ok()));
        }
        expired
    }

    /// 현재 lease 수 (admin 조회용)
    pub fn lease_count(&self) -> usize {
        self.leases.lock().unwrap().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn hash_get_all(&self, key: &str) -> MatchResult<HashMap<String, String>> {
        Ok(self.hashes.read().unwrap().get(key).cloned().unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> MatchResult<()> {
        let mut hashes = self.hashes.write().unwrap();
        let entry = hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            entry.insert(f.clone(), v.clone());
        }
        Ok(())
    }

    async fn hash_create(&self, key: &str, fields: &[(String, String)]) -> MatchResult<bool> {
        let mut hashes = self.hashes.write().unwrap();
        if hashes.contains_key(key) {
            return Ok(false);
        }
        hashes.insert(key.to_string(), fields.iter().cloned().collect());
        Ok(true)
    }

    async fn hash_compare_and_set(
        &self,
        key:    &str,
        expect: &[(String, String)],
        fields: &[(String, String)],
    ) -> MatchResult<bool> {
        let mut hashes = self.hashes.write().unwrap();
        let Some(entry) = hashes.get_mut(key) else {
            return Ok(false);
        };
        if !fields_match(entry, expect) {
            return Ok(false);
        }
        for (f, v) in fields {
            entry.insert(f.clone(), v.clone());
        }
        Ok(true)
    }

    async fn hash_compare_and_delete(&self, key: &str, expect: &[(String, String)]) -> MatchResult<bool> {
        let mut hashes = self.hashes.write().unwrap();
        match hashes.get(key) {
            Some(entry) if fields_match(entry, expect) => {
                hashes.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> MatchResult<bool> {
        let from_hash = self.hashes.write().unwrap().remove(key).is_some();
        let from_list = self.lists.lock().unwrap().remove(key).is_some();
        Ok(from_hash || from_list)
    }

    async fn list_push(&self, key: &str, value: &str) -> MatchResult<usize> {
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len())
    }

    async fn list_pop(&self, key: &str) -> MatchResult<Option<String>> {
        let mut lists = self.lists.lock().unwrap();
        let popped = lists.get_mut(key).and_then(|l| l.pop_front());
        // Redis 와 동일하게 빈 리스트는 키째 사라진다
        if lists.get(key).map_or(false, |l| l.is_empty()) {
            lists.remove(key);
        }
        Ok(popped)
    }

    async fn list_peek(&self, key: &str) -> MatchResult<Option<String>> {
        Ok(self.lists.lock().unwrap().get(key).and_then(|l| l.front().cloned()))
    }

    async fn list_remove(&self, key: &str, value: &str) -> MatchResult<usize> {
        let mut lists = self.lists.lock().unwrap();
        let removed = match lists.get_mut(key) {
            Some(list) => {
                let before = list.len();
                list.retain(|v| v != value);
                before - list.len()
            }
            None => 0,
        };
        if lists.get(key).map_or(false, |l| l.is_empty()) {
            lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_range(&self, key: &str) -> MatchResult<Vec<String>> {
        Ok(self.lists.lock().unwrap()
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> MatchResult<usize> {
        Ok(self.lists.lock().unwrap().get(key).map_or(0, |l| l.len()))
    }

    async fn incr(&self, key: &str) -> MatchResult<i64> {
        let mut counters = self.counters.lock().unwrap();
        let v = counters.entry(key.to_string()).or_insert(0);
        *v += 1;
        Ok(*v)
    }

    async fn set_lease(&self, key: &str, ttl: Duration) -> MatchResult<()> {
        self.leases.lock().unwrap().insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn lease_remaining(&self, key: &str) -> MatchResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self.leases.lock().unwrap()
            .get(key)
            .filter(|deadline| **deadline > now)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn clear_lease(&self, key: &str) -> MatchResult<()> {
        self.leases.lock().unwrap().remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> MatchResult<Vec<String>> {
        Ok(self.hashes.read().unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn subscribe_expired(&self) -> MatchResult<ExpiredRx> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx)
    }
}

fn fields_match(entry: &HashMap<String, String>, expect: &[(String, String)]) -> bool {
    expect.iter().all(|(f, v)| entry.get(f) == Some(v))
}

// ----------------------------------------------------------------------------
// [만료 티커] lease 만료 알림 발생기
// ----------------------------------------------------------------------------

pub async fn run_expiry_ticker(
    store:        Arc<MemoryStore>,
    tick:         Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval(tick);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("[store] expiry ticker started (tick={:?})", tick);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let expired = store.expire_due();
                for key in &expired {
                    trace!("[store] lease expired key={}", key);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("[store] expiry ticker stopped");
}
