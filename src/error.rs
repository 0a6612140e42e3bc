// author: kodeholic (powered by Gemini)

use std::fmt;

#[derive(Debug)]
pub enum MatchError {
    // --- 매칭 코어 ---
    /// StatusEntry 없음 (이미 정리됨)
    NotFound(String),
    /// addUser 중복 - first-writer-wins 위반 (InvariantViolation)
    AlreadyExists(String),
    AlreadyPending(String),
    NotCancellable { user_id: String, status: String },
    InvalidRequest(String),

    // --- 저장소 (TransientStoreFailure) ---
    Store(String),
    StoreTimeout(String),
    Codec(String),

    // --- 세션 ---
    SessionNotFound(String),
    NotParticipant { session_id: String, user_id: String },
    SessionEnded(String),
    /// 문제 카탈로그 호출 실패
    Catalog(String),

    // --- 게이트웨이 ---
    NotAuthenticated,
    InvalidOpcode(u8),
    InvalidPayload(String),
    InternalError(String),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::NotFound(uid) => write!(f, "No matching entry for user: {}", uid),
            MatchError::AlreadyExists(uid) => write!(f, "Matching entry already exists for user: {}", uid),
            MatchError::AlreadyPending(uid) => write!(f, "User {} already has a pending match request", uid),
            MatchError::NotCancellable { user_id, status } =>
                write!(f, "Cannot cancel user {} in status {}", user_id, status),
            MatchError::InvalidRequest(msg) => write!(f, "Invalid match request: {}", msg),
            MatchError::Store(msg) => write!(f, "Store error: {}", msg),
            MatchError::StoreTimeout(op) => write!(f, "Store call timed out: {}", op),
            MatchError::Codec(msg) => write!(f, "Codec error: {}", msg),
            MatchError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            MatchError::NotParticipant { session_id, user_id } =>
                write!(f, "User {} is not a participant of session {}", user_id, session_id),
            MatchError::SessionEnded(id) => write!(f, "Session already ended: {}", id),
            MatchError::Catalog(msg) => write!(f, "Question catalog error: {}", msg),
            MatchError::NotAuthenticated => write!(f, "Not authenticated"),
            MatchError::InvalidOpcode(op) => write!(f, "Invalid opcode: {}", op),
            MatchError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            MatchError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MatchError {}

impl MatchError {
    /// 저장소 장애 여부 - 이 경우 작업은 미처리로 간주하고 다음 tick 에 맡긴다
    pub fn is_transient(&self) -> bool {
        matches!(self, MatchError::Store(_) | MatchError::StoreTimeout(_))
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        MatchError::Codec(err.to_string())
    }
}

pub type MatchResult<T> = Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_only_for_store_failures() {
        assert!(MatchError::Store("down".into()).is_transient());
        assert!(MatchError::StoreTimeout("hget".into()).is_transient());
        assert!(!MatchError::NotFound("u1".into()).is_transient());
        assert!(!MatchError::AlreadyExists("u1".into()).is_transient());
    }

    #[test]
    fn display_names_the_user() {
        let e = MatchError::NotCancellable { user_id: "alice".into(), status: "matched".into() };
        let s = e.to_string();
        assert!(s.contains("alice"));
        assert!(s.contains("matched"));
    }
}
