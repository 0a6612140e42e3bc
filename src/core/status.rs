// author: kodeholic (powered by Claude)
// StatusRegistry - 유저별 매칭 상태 (hash) + liveness lease (만료 키)
//
// 두 조각은 의도적으로 분리되어 있다:
//   match:status:{uid} - 이력 (clear_user 정리에 필요)
//   match:lease:{uid}  - 타임아웃 트리거 (만료돼도 hash 는 남는다)
//
// sessionKey 는 새 매칭 요청이 수락될 때만 바뀐다. 모든 job 은 생성 시점의
// sessionKey 를 들고 다니며, 처리 직전에 레지스트리 값과 비교한다 (compare-and-discard).
// 워커 / TTL / sweeper / cancel 의 상태 전이는 transition* 으로만 한다:
// 읽은 sessionKey + status 가 그대로일 때만 기록되고, 아니면 false.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{trace, warn};

use crate::error::{MatchError, MatchResult};
use crate::store::{keys, Store};

// ----------------------------------------------------------------------------
// [난이도]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy   => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard   => "Hard",
        }
    }

    /// 대소문자 무관 파싱. 알 수 없는 값이면 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy"   => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard"   => Some(Difficulty::Hard),
            _        => None,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// [매칭 상태]
//   waiting      - 풀에서 상대를 기다리는 중 (lease 만료 시 timeout)
//   matching     - 워커가 페어링 판단 중 (lease 만료 시 재연장)
//   matched      - 페어 성사, 세션 핸드오프 완료 대기
//   timeout / disconnected / cancelled - 유예 후 삭제
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Matching,
    Matched,
    Timeout,
    Disconnected,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting      => "waiting",
            MatchStatus::Matching     => "matching",
            MatchStatus::Matched      => "matched",
            MatchStatus::Timeout      => "timeout",
            MatchStatus::Disconnected => "disconnected",
            MatchStatus::Cancelled    => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting"      => Some(MatchStatus::Waiting),
            "matching"     => Some(MatchStatus::Matching),
            "matched"      => Some(MatchStatus::Matched),
            "timeout"      => Some(MatchStatus::Timeout),
            "disconnected" => Some(MatchStatus::Disconnected),
            "cancelled"    => Some(MatchStatus::Cancelled),
            _              => None,
        }
    }

    /// 새 요청을 막는 상태
    pub fn is_pending(&self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::Matching | MatchStatus::Matched)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::Matching)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// [StatusEntry]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub user_id:      String,
    pub status:       MatchStatus,
    pub session_key:  i64,
    pub difficulty:   Difficulty,
    pub topics:       Vec<String>,   // 요청자가 나열한 순서 유지
    pub last_seen:    u64,           // Unix millis (heartbeat)
    pub matching_id:  Option<String>,
    pub requested_at: u64,
}

impl StatusEntry {
    pub fn new(user_id: &str, session_key: i64, difficulty: Difficulty, topics: Vec<String>, now: u64) -> Self {
        Self {
            user_id:      user_id.to_string(),
            status:       MatchStatus::Waiting,
            session_key,
            difficulty,
            topics,
            last_seen:    now,
            matching_id:  None,
            requested_at: now,
        }
    }

    /// 상태만 바꾼 사본 (clear_user 스냅샷용)
    pub fn with_status(&self, status: MatchStatus) -> Self {
        let mut snapshot = self.clone();
        snapshot.status = status;
        snapshot
    }

    fn to_fields(&self) -> MatchResult<Vec<(String, String)>> {
        let mut fields = vec![
            ("userId".to_string(),      self.user_id.clone()),
            ("status".to_string(),      self.status.as_str().to_string()),
            ("sessionKey".to_string(),  self.session_key.to_string()),
            ("difficulty".to_string(),  self.difficulty.as_str().to_string()),
            ("topics".to_string(),      serde_json::to_string(&self.topics)?),
            ("lastSeen".to_string(),    self.last_seen.to_string()),
            ("requestedAt".to_string(), self.requested_at.to_string()),
        ];
        if let Some(mid) = &self.matching_id {
            fields.push(("matchingId".to_string(), mid.clone()));
        }
        Ok(fields)
    }

    fn from_fields(user_id: &str, h: &HashMap<String, String>) -> MatchResult<Self> {
        let field = |name: &str| -> MatchResult<&String> {
            h.get(name).ok_or_else(|| MatchError::Codec(format!("{}: missing field {}", user_id, name)))
        };
        let parse_u64 = |name: &str| -> MatchResult<u64> {
            field(name)?.parse::<u64>().map_err(|e| MatchError::Codec(format!("{}: {} {}", user_id, name, e)))
        };

        let status = MatchStatus::parse(field("status")?)
            .ok_or_else(|| MatchError::Codec(format!("{}: bad status", user_id)))?;
        let difficulty = Difficulty::parse(field("difficulty")?)
            .ok_or_else(|| MatchError::Codec(format!("{}: bad difficulty", user_id)))?;
        let session_key = field("sessionKey")?.parse::<i64>()
            .map_err(|e| MatchError::Codec(format!("{}: sessionKey {}", user_id, e)))?;
        let topics: Vec<String> = serde_json::from_str(field("topics")?)?;

        Ok(Self {
            user_id: user_id.to_string(),
            status,
            session_key,
            difficulty,
            topics,
            last_seen:    parse_u64("lastSeen")?,
            matching_id:  h.get("matchingId").filter(|m| !m.is_empty()).cloned(),
            requested_at: parse_u64("requestedAt")?,
        })
    }
}

// ----------------------------------------------------------------------------
// [StatusRegistry]
// ----------------------------------------------------------------------------

fn guard(session_key: i64, status: MatchStatus) -> Vec<(String, String)> {
    vec![
        ("sessionKey".to_string(), session_key.to_string()),
        ("status".to_string(),     status.as_str().to_string()),
    ]
}

#[derive(Clone)]
pub struct StatusRegistry {
    store: Store,
}

impl StatusRegistry {
    pub fn new(store: Store) -> Self {
        trace!("Initializing StatusRegistry");
        Self { store }
    }

    /// 전역 증가 카운터에서 새 sessionKey 발급
    pub async fn next_session_key(&self) -> MatchResult<i64> {
        self.store.incr(keys::SESSION_KEY).await
    }

    /// 엔트리가 이미 있으면 AlreadyExists - 덮어쓰지 않는다
    pub async fn add_user(&self, entry: &StatusEntry) -> MatchResult<()> {
        let created = self.store.hash_create(&keys::status(&entry.user_id), &entry.to_fields()?).await?;
        if !created {
            warn!("[registry] add_user conflict user={}", entry.user_id);
            return Err(MatchError::AlreadyExists(entry.user_id.clone()));
        }
        trace!("[registry] added user={} key={}", entry.user_id, entry.session_key);
        Ok(())
    }

    /// 디코딩 불가한 hash 는 경합으로 남은 부분 기록이므로 버리고 None 취급
    pub async fn get_user_data(&self, user_id: &str) -> MatchResult<Option<StatusEntry>> {
        let key = keys::status(user_id);
        let h = self.store.hash_get_all(&key).await?;
        if h.is_empty() {
            return Ok(None);
        }
        match StatusEntry::from_fields(user_id, &h) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("[registry] discarding corrupt entry user={}: {}", user_id, e);
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// 무조건 덮어쓰기 - admin / 테스트 전용. 경합 가능한 경로는 transition 사용
    pub async fn update_status(&self, user_id: &str, status: MatchStatus) -> MatchResult<()> {
        self.store.hash_set(&keys::status(user_id), &[
            ("status".to_string(), status.as_str().to_string()),
        ]).await
    }

    /// (sessionKey, from) 이 그대로일 때만 to 로 전이
    pub async fn transition(&self, user_id: &str, session_key: i64, from: MatchStatus, to: MatchStatus) -> MatchResult<bool> {
        let moved = self.store.hash_compare_and_set(
            &keys::status(user_id),
            &guard(session_key, from),
            &[("status".to_string(), to.as_str().to_string())],
        ).await?;
        if !moved {
            trace!("[registry] transition {} → {} lost user={} key={}", from, to, user_id, session_key);
        }
        Ok(moved)
    }

    pub async fn transition_matched(&self, user_id: &str, session_key: i64, from: MatchStatus, matching_id: &str) -> MatchResult<bool> {
        self.store.hash_compare_and_set(
            &keys::status(user_id),
            &guard(session_key, from),
            &[
                ("status".to_string(),     MatchStatus::Matched.as_str().to_string()),
                ("matchingId".to_string(), matching_id.to_string()),
            ],
        ).await
    }

    /// 상대 확정 실패 시 matched 되돌리기. matchingId 는 비운다
    pub async fn revert_matched(&self, user_id: &str, session_key: i64, matching_id: &str, to: MatchStatus) -> MatchResult<bool> {
        let mut expect = guard(session_key, MatchStatus::Matched);
        expect.push(("matchingId".to_string(), matching_id.to_string()));
        self.store.hash_compare_and_set(
            &keys::status(user_id),
            &expect,
            &[
                ("status".to_string(),     to.as_str().to_string()),
                ("matchingId".to_string(), String::new()),
            ],
        ).await
    }

    /// 스냅샷 이후 heartbeat 도 없었을 때만 전이 (sweeper 용)
    pub async fn transition_if_unseen(&self, snapshot: &StatusEntry, to: MatchStatus) -> MatchResult<bool> {
        let mut expect = guard(snapshot.session_key, snapshot.status);
        expect.push(("lastSeen".to_string(), snapshot.last_seen.to_string()));
        self.store.hash_compare_and_set(
            &keys::status(&snapshot.user_id),
            &expect,
            &[("status".to_string(), to.as_str().to_string())],
        ).await
    }

    pub async fn update_last_seen(&self, user_id: &str, ts: u64) -> MatchResult<()> {
        self.store.hash_set(&keys::status(user_id), &[
            ("lastSeen".to_string(), ts.to_string()),
        ]).await
    }

    /// 없는 유저 삭제는 no-op. 존재했으면 true
    pub async fn remove_user(&self, user_id: &str) -> MatchResult<bool> {
        self.store.delete(&keys::status(user_id)).await
    }

    /// 읽은 시점의 (sessionKey, status) 그대로일 때만 삭제 - 그 사이 재요청된 엔트리는 보존
    pub async fn remove_if_unchanged(&self, snapshot: &StatusEntry) -> MatchResult<bool> {
        self.store.hash_compare_and_delete(
            &keys::status(&snapshot.user_id),
            &guard(snapshot.session_key, snapshot.status),
        ).await
    }

    pub async fn set_lease(&self, user_id: &str, ttl: Duration) -> MatchResult<()> {
        self.store.set_lease(&keys::lease(user_id), ttl).await
    }

    pub async fn get_lease_remaining(&self, user_id: &str) -> MatchResult<Option<Duration>> {
        self.store.lease_remaining(&keys::lease(user_id)).await
    }

    pub async fn clear_lease(&self, user_id: &str) -> MatchResult<()> {
        self.store.clear_lease(&keys::lease(user_id)).await
    }

    /// 전체 StatusEntry 스냅샷 (sweeper / admin 조회용)
    pub async fn all_users(&self) -> MatchResult<Vec<StatusEntry>> {
        let status_keys = self.store.scan_prefix(keys::STATUS_PREFIX).await?;
        let mut out = Vec::with_capacity(status_keys.len());
        for key in status_keys {
            let Some(user_id) = keys::user_from_status(&key) else { continue };
            // 스캔과 읽기 사이에 삭제된 유저는 그냥 건너뜀
            if let Some(entry) = self.get_user_data(user_id).await? {
                out.push(entry);
            }
        }
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(out)
    }
}
