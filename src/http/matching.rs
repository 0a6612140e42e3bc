// author: kodeholic (powered by Claude)
// 매칭 API 핸들러 - 로직은 MatchService, 여기서는 헤더/본문 해석과 응답 변환만

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::trace;

use super::dto::{MatchQueued, MatchRequestBody};
use super::state::HttpState;
use super::{caller_id, error_response};

/// POST /match/request
pub async fn match_request(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(body): Json<MatchRequestBody>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };
    trace!("[api] POST /match/request user={} body={:?}", user_id, body);

    match state.matching.request_match(&user_id, &body.difficulty, &body.topics).await {
        Ok(session_key) => Json(MatchQueued { status: "queued", session_key }).into_response(),
        Err(e)          => error_response(e),
    }
}

/// GET /match/status
pub async fn match_status(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };

    match state.matching.status(&user_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e)   => error_response(e),
    }
}

/// DELETE /match/cancel
pub async fn match_cancel(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };

    match state.matching.cancel(&user_id).await {
        Ok(()) => Json(serde_json::json!({ "status": "cancelled" })).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /match/heartbeat
pub async fn match_heartbeat(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(uid) => uid,
        Err(e)  => return error_response(e),
    };

    match state.matching.heartbeat(&user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
