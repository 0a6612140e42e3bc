// author: kodeholic (powered by Claude)

use serde::{Deserialize, Serialize};

use crate::core::Session;

// ----------------------------------------------------------------------------
// [공통] Gateway 패킷 봉투 (Envelope)
// ----------------------------------------------------------------------------

/// 모든 WebSocket 메시지의 최상위 구조체
/// 수신/송신 공통으로 사용하며, payload는 op에 따라 해석합니다.
///
/// 예시:
///   { "op": 40, "d": { "session_id": "6f1c..." } }
#[derive(Serialize, Deserialize, Debug)]
pub struct GatewayPacket {
    /// opcode (protocol::opcode 참조)
    pub op: u8,
    /// payload. op에 따라 구조가 달라지므로 raw JSON으로 보관
    pub d: Option<serde_json::Value>,
}

// ----------------------------------------------------------------------------
// [C→S] 클라이언트 요청 payload 타입들
// ----------------------------------------------------------------------------

/// op: IDENTIFY (3)
#[derive(Deserialize, Debug)]
pub struct IdentifyPayload {
    pub user_id: String,
}

/// op: SESSION_READY / SESSION_LEAVE / SESSION_END (40~42)
#[derive(Deserialize, Debug)]
pub struct SessionOpPayload {
    pub session_id: String,
}

// ----------------------------------------------------------------------------
// [S→C] 서버 응답 payload 타입들
// ----------------------------------------------------------------------------

/// op: HELLO (0) - 연결 직후 heartbeat 주기 안내
#[derive(Serialize, Debug)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// op: READY (4) - IDENTIFY 성공 응답
#[derive(Serialize, Debug)]
pub struct ReadyPayload {
    pub user_id: String,
    /// 이미 배정된 세션 (재접속 시 바로 바인딩)
    pub session: Option<Session>,
}

/// op: SESSION_CREATED / STATE / START / ENDED (120~123)
#[derive(Serialize, Debug)]
pub struct SessionEventPayload {
    pub session:   Session,
    pub all_ready: bool,
}

impl SessionEventPayload {
    pub fn of(session: &Session) -> Self {
        Self { all_ready: session.all_ready(), session: session.clone() }
    }
}

/// op: ACK (200) - 요청 성공 응답
/// data는 op마다 다르므로 raw Value 사용
#[derive(Serialize, Debug)]
pub struct AckPayload {
    pub op:   u8,
    pub data: serde_json::Value,
}

/// op: ERROR (201)
#[derive(Serialize, Debug)]
pub struct ErrorPayload {
    pub code:   u16,
    pub reason: String,
}

// ----------------------------------------------------------------------------
// [헬퍼] 서버 응답 패킷 생성 함수
// ----------------------------------------------------------------------------

impl GatewayPacket {
    pub fn new(op: u8, payload: impl Serialize) -> Self {
        Self {
            op,
            d: Some(serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)),
        }
    }

    pub fn no_data(op: u8) -> Self {
        Self { op, d: None }
    }
}

/// 직렬화된 송신 패킷
pub fn make_packet(op: u8, payload: impl Serialize) -> String {
    serde_json::to_string(&GatewayPacket::new(op, payload)).unwrap_or_default()
}

pub fn make_no_data(op: u8) -> String {
    serde_json::to_string(&GatewayPacket::no_data(op)).unwrap_or_default()
}
