// author: kodeholic (powered by Claude)
// HTTP 요청/응답 DTO - 매칭 API / Admin 공용

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{BucketInfo, StatusEntry};

// ----------------------------------------------------------------------------
// [매칭 API]
// ----------------------------------------------------------------------------

/// POST /match/request 본문
#[derive(Deserialize, Debug)]
pub struct MatchRequestBody {
    pub difficulty: String,
    #[serde(default)]
    pub topics:     Vec<String>,
}

/// POST /match/request 응답
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MatchQueued {
    pub status:      &'static str,
    pub session_key: i64,
}

// ----------------------------------------------------------------------------
// [Admin]
// ----------------------------------------------------------------------------

/// GET /admin/status
#[derive(Serialize)]
pub struct ServerStatus {
    pub uptime_secs:     u64,
    pub user_count:      usize,
    pub by_status:       BTreeMap<String, usize>,
    pub entry_queue_len: usize,
    pub fcfs_len:        usize,
    pub session_count:   usize,
    pub active_sessions: usize,
    pub ws_connections:  usize,
    pub sweeper_running: bool,
}

/// GET /admin/users 아이템
#[derive(Serialize)]
pub struct AdminUserSummary {
    pub user_id:        String,
    pub status:         String,
    pub difficulty:     String,
    pub topics:         Vec<String>,
    pub session_key:    i64,
    pub idle_secs:      u64,          // 마지막 heartbeat 이후 경과 초
    pub lease_secs:     Option<u64>,  // 남은 lease (없으면 None)
    pub queue_position: Option<usize>,
}

/// GET /admin/users/{user_id}
#[derive(Serialize)]
pub struct AdminUserDetail {
    pub entry:          StatusEntry,
    pub idle_secs:      u64,
    pub lease_secs:     Option<u64>,
    pub queue_position: Option<usize>,
    pub connected:      bool,          // 게이트웨이 WS 접속 여부
    pub session_id:     Option<String>,
}

/// GET /admin/pool
#[derive(Serialize)]
pub struct AdminPool {
    pub buckets: Vec<BucketInfo>,
    pub fcfs:    Vec<AdminFcfsEntry>,
}

#[derive(Serialize)]
pub struct AdminFcfsEntry {
    pub position:    usize,
    pub user_id:     String,
    pub session_key: i64,
}

/// GET /admin/sessions 아이템
#[derive(Serialize)]
pub struct AdminSessionSummary {
    pub id:                 String,
    pub matching_id:        String,
    pub question_id:        String,
    pub difficulty:         String,
    pub topic:              String,
    pub participants:       Vec<String>,  // "alice:ready"
    pub all_ready:          bool,
    pub created_at:         u64,
    pub termination_reason: Option<String>,
}
