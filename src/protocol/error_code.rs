// author: kodeholic (powered by Claude)

use crate::error::MatchError;

/// 1xxx: 연결/인증
pub const NOT_AUTHENTICATED:  u16 = 1000;
pub const INVALID_OPCODE:     u16 = 1003;
pub const INVALID_PAYLOAD:    u16 = 1004;

/// 2xxx: 매칭
pub const MATCH_NOT_FOUND:    u16 = 2000;
pub const ALREADY_PENDING:    u16 = 2001;
pub const ALREADY_EXISTS:     u16 = 2002;
pub const NOT_CANCELLABLE:    u16 = 2003;
pub const INVALID_REQUEST:    u16 = 2004;

/// 3xxx: 세션
pub const SESSION_NOT_FOUND:  u16 = 3000;
pub const NOT_PARTICIPANT:    u16 = 3001;
pub const SESSION_ENDED:      u16 = 3002;

/// 9xxx: 서버 내부 / 저장소
pub const INTERNAL_ERROR:     u16 = 9000;
pub const STORE_UNAVAILABLE:  u16 = 9001;

/// MatchError → 에러 코드 변환
pub fn to_error_code(err: &MatchError) -> u16 {
    match err {
        MatchError::NotAuthenticated          => NOT_AUTHENTICATED,
        MatchError::InvalidOpcode(_)          => INVALID_OPCODE,
        MatchError::InvalidPayload(_)         => INVALID_PAYLOAD,

        MatchError::NotFound(_)               => MATCH_NOT_FOUND,
        MatchError::AlreadyPending(_)         => ALREADY_PENDING,
        MatchError::AlreadyExists(_)          => ALREADY_EXISTS,
        MatchError::NotCancellable { .. }     => NOT_CANCELLABLE,
        MatchError::InvalidRequest(_)         => INVALID_REQUEST,

        MatchError::SessionNotFound(_)        => SESSION_NOT_FOUND,
        MatchError::NotParticipant { .. }     => NOT_PARTICIPANT,
        MatchError::SessionEnded(_)           => SESSION_ENDED,

        MatchError::Store(_)
        | MatchError::StoreTimeout(_)         => STORE_UNAVAILABLE,
        MatchError::Codec(_)
        | MatchError::Catalog(_)
        | MatchError::InternalError(_)        => INTERNAL_ERROR,
    }
}
