// author: kodeholic (powered by Claude)
// RedisStore - 여러 프로세스가 같은 매칭 상태를 공유할 때 사용하는 백엔드
//
// lease 는 "SET key 1 PX ttl" 문자열 키, 만료 알림은 keyspace notification
// (__keyevent@*__:expired) 을 PSUBSCRIBE 해서 받는다.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{MatchError, MatchResult};

use super::{ExpiredRx, SharedStore};

const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";
const SCAN_COUNT: usize = 200;

/// 키가 없을 때만 HSET - 단일 스크립트라 원자적
const HASH_CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// ARGV = [기대 필드 수 n, f1, v1, ..., fn, vn, 기록할 f, v, ...]
const HASH_CAS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local n = tonumber(ARGV[1])
for i = 0, n - 1 do
    if redis.call('HGET', KEYS[1], ARGV[2 + i * 2]) ~= ARGV[3 + i * 2] then
        return 0
    end
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2 + n * 2))
return 1
"#;

/// ARGV = [f1, v1, ...] - 전부 일치할 때만 DEL
const HASH_CAD_SCRIPT: &str = r#"
for i = 1, #ARGV, 2 do
    if redis.call('HGET', KEYS[1], ARGV[i]) ~= ARGV[i + 1] then
        return 0
    end
end
return redis.call('DEL', KEYS[1])
"#;

fn store_err(e: redis::RedisError) -> MatchError {
    MatchError::Store(e.to_string())
}

pub struct RedisStore {
    client: redis::Client,
    conn:   MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> MatchResult<Self> {
        info!("[store] connecting to redis {}", url);
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn   = client.get_multiplexed_async_connection().await.map_err(store_err)?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn hash_get_all(&self, key: &str) -> MatchResult<HashMap<String, String>> {
        let mut c = self.conn.clone();
        c.hgetall(key).await.map_err(store_err)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> MatchResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut c = self.conn.clone();
        c.hset_multiple::<_, _, _, ()>(key, fields).await.map_err(store_err)
    }

    async fn hash_create(&self, key: &str, fields: &[(String, String)]) -> MatchResult<bool> {
        let mut c = self.conn.clone();
        let script = redis::Script::new(HASH_CREATE_SCRIPT);
        let mut invocation = script.key(key);
        for (f, v) in fields {
            invocation.arg(f).arg(v);
        }
        let written: i64 = invocation.invoke_async(&mut c).await.map_err(store_err)?;
        Ok(written == 1)
    }

    async fn hash_compare_and_set(
        &self,
        key:    &str,
        expect: &[(String, String)],
        fields: &[(String, String)],
    ) -> MatchResult<bool> {
        if fields.is_empty() {
            return Ok(false);
        }
        let mut c = self.conn.clone();
        let script = redis::Script::new(HASH_CAS_SCRIPT);
        let mut invocation = script.key(key);
        invocation.arg(expect.len());
        for (f, v) in expect.iter().chain(fields) {
            invocation.arg(f).arg(v);
        }
        let written: i64 = invocation.invoke_async(&mut c).await.map_err(store_err)?;
        Ok(written == 1)
    }

    async fn hash_compare_and_delete(&self, key: &str, expect: &[(String, String)]) -> MatchResult<bool> {
        let mut c = self.conn.clone();
        let script = redis::Script::new(HASH_CAD_SCRIPT);
        let mut invocation = script.key(key);
        for (f, v) in expect {
            invocation.arg(f).arg(v);
        }
        let deleted: i64 = invocation.invoke_async(&mut c).await.map_err(store_err)?;
        Ok(deleted > 0)
    }

    async fn delete(&self, key: &str) -> MatchResult<bool> {
        let mut c = self.conn.clone();
        let n: i64 = c.del(key).await.map_err(store_err)?;
        Ok(n > 0)
    }

    async fn list_push(&self, key: &str, value: &str) -> MatchResult<usize> {
        let mut c = self.conn.clone();
        c.rpush(key, value).await.map_err(store_err)
    }

    async fn list_pop(&self, key: &str) -> MatchResult<Option<String>> {
        let mut c = self.conn.clone();
        c.lpop(key, None).await.map_err(store_err)
    }

    async fn list_peek(&self, key: &str) -> MatchResult<Option<String>> {
        let mut c = self.conn.clone();
        c.lindex(key, 0).await.map_err(store_err)
    }

    async fn list_remove(&self, key: &str, value: &str) -> MatchResult<usize> {
        let mut c = self.conn.clone();
        c.lrem(key, 0, value).await.map_err(store_err)
    }

    async fn list_range(&self, key: &str) -> MatchResult<Vec<String>> {
        let mut c = self.conn.clone();
        c.lrange(key, 0, -1).await.map_err(store_err)
    }

    async fn list_len(&self, key: &str) -> MatchResult<usize> {
        let mut c = self.conn.clone();
        c.llen(key).await.map_err(store_err)
    }

    async fn incr(&self, key: &str) -> MatchResult<i64> {
        let mut c = self.conn.clone();
        c.incr(key, 1i64).await.map_err(store_err)
    }

    async fn set_lease(&self, key: &str, ttl: Duration) -> MatchResult<()> {
        let mut c  = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        redis::cmd("SET").arg(key).arg(1).arg("PX").arg(ttl_ms)
            .query_async::<_, ()>(&mut c)
            .await
            .map_err(store_err)
    }

    async fn lease_remaining(&self, key: &str) -> MatchResult<Option<Duration>> {
        let mut c = self.conn.clone();
        // -2: 키 없음, -1: 만료 없음
        let pttl: i64 = redis::cmd("PTTL").arg(key)
            .query_async(&mut c)
            .await
            .map_err(store_err)?;
        Ok((pttl > 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn clear_lease(&self, key: &str) -> MatchResult<()> {
        self.delete(key).await.map(|_| ())
    }

    async fn scan_prefix(&self, prefix: &str) -> MatchResult<Vec<String>> {
        let mut c       = self.conn.clone();
        let pattern     = format!("{}*", prefix);
        let mut cursor  = 0u64;
        let mut out     = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH").arg(&pattern)
                .arg("COUNT").arg(SCAN_COUNT)
                .query_async(&mut c)
                .await
                .map_err(store_err)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn subscribe_expired(&self) -> MatchResult<ExpiredRx> {
        // 관리형 Redis 는 CONFIG 를 막는 경우가 있다 - 실패해도 서버 설정을 믿고 진행
        let mut c = self.conn.clone();
        if let Err(e) = redis::cmd("CONFIG").arg("SET").arg("notify-keyspace-events").arg("Ex")
            .query_async::<_, ()>(&mut c)
            .await
        {
            warn!("[store] CONFIG SET notify-keyspace-events failed: {}", e);
        }

        let mut pubsub = self.client.get_async_pubsub().await.map_err(store_err)?;
        pubsub.psubscribe(EXPIRED_PATTERN).await.map_err(store_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let key: String = match msg.get_payload() {
                    Ok(k)  => k,
                    Err(e) => {
                        warn!("[store] bad expiry payload: {}", e);
                        continue;
                    }
                };
                if tx.send(key).is_err() {
                    break;
                }
            }
            warn!("[store] redis expiry subscription closed");
        });

        info!("[store] subscribed to {}", EXPIRED_PATTERN);
        Ok(rx)
    }
}
