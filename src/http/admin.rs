// author: kodeholic (powered by Claude)
// Admin REST API 핸들러
//
// 조회
//   GET /admin/status                  → 서버 상태 요약
//   GET /admin/users                   → StatusEntry 전체 목록
//   GET /admin/users/{user_id}         → StatusEntry 상세 (lease / 순번 / 세션)
//   GET /admin/pool                    → 버킷별 크기 + FCFS 목록
//   GET /admin/sessions                → 세션 전체 목록
//   GET /admin/sessions/{session_id}   → 세션 상세
//
// 조작
//   POST /admin/clear/{user_id}        → 매칭 상태 강제 정리

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;

use crate::core::{Session, StatusEntry};
use crate::error::{MatchError, MatchResult};
use crate::utils::current_timestamp;

use super::dto::*;
use super::error_response;
use super::state::HttpState;

// ----------------------------------------------------------------------------
// [유틸]
// ----------------------------------------------------------------------------

async fn lease_secs(state: &HttpState, user_id: &str) -> MatchResult<Option<u64>> {
    Ok(state.registry.get_lease_remaining(user_id).await?.map(|d| d.as_secs()))
}

fn session_summary(s: &Session) -> AdminSessionSummary {
    AdminSessionSummary {
        id:           s.id.clone(),
        matching_id:  s.matching_id.clone(),
        question_id:  s.question_id.clone(),
        difficulty:   s.difficulty.to_string(),
        topic:        s.topic.clone(),
        participants: s.participants.iter()
            .map(|p| format!("{}:{}", p.user_id, p.state.as_str()))
            .collect(),
        all_ready:          s.all_ready(),
        created_at:         s.created_at,
        termination_reason: s.termination_reason.map(|r| r.as_str().to_string()),
    }
}

async fn user_summary(state: &HttpState, e: StatusEntry, now: u64) -> MatchResult<AdminUserSummary> {
    Ok(AdminUserSummary {
        lease_secs:     lease_secs(state, &e.user_id).await?,
        queue_position: state.pool.queue_position(&e.user_id).await?,
        idle_secs:      now.saturating_sub(e.last_seen) / 1000,
        status:         e.status.to_string(),
        difficulty:     e.difficulty.to_string(),
        session_key:    e.session_key,
        topics:         e.topics,
        user_id:        e.user_id,
    })
}

// ----------------------------------------------------------------------------
// [핸들러]
// ----------------------------------------------------------------------------

/// GET /admin/status
pub async fn admin_status(State(state): State<HttpState>) -> Response {
    let result: MatchResult<ServerStatus> = async {
        let users = state.registry.all_users().await?;
        let mut by_status = BTreeMap::new();
        for e in &users {
            *by_status.entry(e.status.to_string()).or_insert(0) += 1;
        }
        Ok(ServerStatus {
            uptime_secs:     current_timestamp().saturating_sub(state.start_time_ms) / 1000,
            user_count:      users.len(),
            by_status,
            entry_queue_len: state.queue.len().await?,
            fcfs_len:        state.pool.fcfs_len().await?,
            session_count:   state.sessions.hub().count(),
            active_sessions: state.sessions.hub().count_active(),
            ws_connections:  state.user_hub.count(),
            sweeper_running: state.sweeper.is_running(),
        })
    }.await;

    match result {
        Ok(s)  => Json(s).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /admin/users
pub async fn admin_list_users(State(state): State<HttpState>) -> Response {
    let result: MatchResult<Vec<AdminUserSummary>> = async {
        let now = current_timestamp();
        let mut list = Vec::new();
        for e in state.registry.all_users().await? {
            list.push(user_summary(&state, e, now).await?);
        }
        Ok(list)
    }.await;

    match result {
        Ok(list) => Json(list).into_response(),
        Err(e)   => error_response(e),
    }
}

/// GET /admin/users/{user_id}
pub async fn admin_get_user(
    State(state): State<HttpState>,
    Path(user_id): Path<String>,
) -> Response {
    let result: MatchResult<AdminUserDetail> = async {
        let entry = state.registry.get_user_data(&user_id).await?
            .ok_or_else(|| MatchError::NotFound(user_id.clone()))?;
        Ok(AdminUserDetail {
            idle_secs:      current_timestamp().saturating_sub(entry.last_seen) / 1000,
            lease_secs:     lease_secs(&state, &user_id).await?,
            queue_position: state.pool.queue_position(&user_id).await?,
            connected:      state.user_hub.is_connected(&user_id),
            session_id:     state.sessions.by_user(&user_id).map(|s| s.id),
            entry,
        })
    }.await;

    match result {
        Ok(d)  => Json(d).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /admin/pool
pub async fn admin_pool(State(state): State<HttpState>) -> Response {
    let result: MatchResult<AdminPool> = async {
        let buckets = state.pool.bucket_sizes().await?;
        let fcfs = state.pool.fcfs_entries().await?
            .into_iter()
            .enumerate()
            .map(|(i, e)| AdminFcfsEntry { position: i + 1, user_id: e.user_id, session_key: e.session_key })
            .collect();
        Ok(AdminPool { buckets, fcfs })
    }.await;

    match result {
        Ok(p)  => Json(p).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /admin/sessions
pub async fn admin_list_sessions(State(state): State<HttpState>) -> impl IntoResponse {
    let list: Vec<AdminSessionSummary> = state.sessions.hub().all().iter().map(session_summary).collect();
    Json(list)
}

/// GET /admin/sessions/{session_id}
pub async fn admin_get_session(
    State(state): State<HttpState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.hub().get(&session_id) {
        Some(s) => Json(s).into_response(),
        None    => error_response(MatchError::SessionNotFound(session_id)),
    }
}

/// POST /admin/clear/{user_id}
pub async fn admin_clear_user(
    State(state): State<HttpState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.matching.force_clear(&user_id).await {
        Ok(entry) => Json(serde_json::json!({
            "cleared":     user_id,
            "was":         entry.status,
            "session_key": entry.session_key,
        })).into_response(),
        Err(e) => error_response(e),
    }
}
