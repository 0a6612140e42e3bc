// author: kodeholic (powered by Claude)
// 세션 조회/조작 핸들러 - 협업 트랜스포트가 바인딩할 때 사용

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::MatchError;

use super::state::HttpState;
use super::{caller_id, error_response};

/// GET /session/by-user/{user_id}
pub async fn session_by_user(
    State(state): State<HttpState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.sessions.by_user(&user_id) {
        Some(s) => Json(s).into_response(),
        None    => error_response(MatchError::SessionNotFound(format!("user {}", user_id))),
    }
}

/// GET /session/by-match/{matching_id}
pub async fn session_by_match(
    State(state): State<HttpState>,
    Path(matching_id): Path<String>,
) -> Response {
    match state.sessions.by_matching_id(&matching_id) {
        Some(s) => Json(s).into_response(),
        None    => error_response(MatchError::SessionNotFound(format!("match {}", matching_id))),
    }
}

/// POST /session/{session_id}/ready
pub async fn session_ready(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };
    match state.sessions.ready_user(&session_id, &user_id).await {
        Ok(s)  => Json(s).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/{session_id}/leave
pub async fn session_leave(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };
    match state.sessions.leave_user(&session_id, &user_id).await {
        Ok(s)  => Json(s).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/{session_id}/end
pub async fn session_end(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };
    match state.sessions.end(&session_id, &user_id).await {
        Ok(s)  => Json(s).into_response(),
        Err(e) => error_response(e),
    }
}
