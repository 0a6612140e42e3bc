// author: kodeholic (powered by Claude)
//
// HTTP REST API
//
// 매칭 (x-user-id 헤더 = 인증 계층이 검증한 유저)
//   POST   /match/request        → 매칭 요청 접수
//   GET    /match/status         → 현재 상태 + 남은 시간 + 대기 순번
//   DELETE /match/cancel         → 대기/판단 중 요청 취소
//   POST   /match/heartbeat      → lastSeen 갱신
//
// 세션 (협업 트랜스포트 바인딩)
//   GET  /session/by-user/{user_id}
//   GET  /session/by-match/{matching_id}
//   POST /session/{session_id}/ready | leave | end
//
// Admin / Trace 는 admin.rs, trace.rs 참조

pub mod admin;
pub mod dto;
pub mod matching;
pub mod session;
pub mod state;
pub mod trace;

pub use admin::*;
pub use matching::*;
pub use session::*;
pub use state::HttpState;
pub use trace::trace_stream;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::error::MatchError;

/// 인증 계층이 붙여주는 검증된 유저 id 헤더
pub const USER_ID_HEADER: &str = "x-user-id";

/// 요청자 user_id 추출. 없거나 비어 있으면 NotAuthenticated
pub fn caller_id(headers: &HeaderMap) -> Result<String, MatchError> {
    headers.get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(MatchError::NotAuthenticated)
}

/// MatchError → HTTP 상태 코드 (한 곳에서만 매핑)
pub fn status_code(err: &MatchError) -> StatusCode {
    match err {
        MatchError::NotAuthenticated           => StatusCode::UNAUTHORIZED,
        MatchError::InvalidRequest(_)
        | MatchError::InvalidPayload(_)
        | MatchError::InvalidOpcode(_)
        | MatchError::AlreadyPending(_)
        | MatchError::NotCancellable { .. }
        | MatchError::SessionEnded(_)          => StatusCode::BAD_REQUEST,
        MatchError::NotParticipant { .. }      => StatusCode::FORBIDDEN,
        MatchError::NotFound(_)
        | MatchError::SessionNotFound(_)       => StatusCode::NOT_FOUND,
        MatchError::AlreadyExists(_)           => StatusCode::CONFLICT,
        MatchError::Store(_)
        | MatchError::StoreTimeout(_)          => StatusCode::SERVICE_UNAVAILABLE,
        MatchError::Codec(_)
        | MatchError::Catalog(_)
        | MatchError::InternalError(_)         => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: MatchError) -> Response {
    let code = status_code(&err);
    if code.is_server_error() {
        warn!("[api] {} → {}", err, code);
    }
    (code, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
