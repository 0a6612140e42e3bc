// author: kodeholic (powered by Claude)

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config;
use crate::core::UserHub;
use crate::error::MatchError;
use crate::handoff::SessionManager;
use crate::matching::MatchService;
use crate::protocol::{
    error_code::to_error_code,
    message::{
        make_no_data, make_packet, AckPayload, ErrorPayload, GatewayPacket, HelloPayload,
        IdentifyPayload, ReadyPayload, SessionEventPayload, SessionOpPayload,
    },
    opcode::{client, server},
};

// ----------------------------------------------------------------------------
// [공유 상태]
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub user_hub: Arc<UserHub>,
    pub sessions: Arc<SessionManager>,
    pub matching: Arc<MatchService>,
}

// ----------------------------------------------------------------------------
// [WS 진입점]
// ----------------------------------------------------------------------------

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

// ----------------------------------------------------------------------------
// [연결 상태] - 개별 WS 연결마다 보유
// ----------------------------------------------------------------------------

struct Conn {
    user_id: Option<String>,
}

impl Conn {
    fn new() -> Self {
        Self { user_id: None }
    }

    fn require_user(&self) -> Result<&str, MatchError> {
        self.user_id.as_deref().ok_or(MatchError::NotAuthenticated)
    }
}

// ----------------------------------------------------------------------------
// [핵심] 개별 클라이언트 WS 생명주기
// ----------------------------------------------------------------------------

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (egress_tx, mut egress_rx) = mpsc::channel::<String>(config::EGRESS_QUEUE_SIZE);

    let mut conn = Conn::new();

    let hello = make_packet(server::HELLO, HelloPayload {
        heartbeat_interval: config::HEARTBEAT_INTERVAL_MS,
    });
    if ws_tx.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    // [rx_loop] egress_rx → WS 송신
    let rx_loop = tokio::spawn(async move {
        while let Some(json) = egress_rx.recv().await {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // [tx_loop] WS 수신 → 핸들러 dispatch
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t))  => t,
            Ok(Message::Close(_)) => break,
            Err(e) => { warn!("[gateway] ws error: {}", e); break; }
            _ => continue,
        };

        let packet: GatewayPacket = match serde_json::from_str(&text) {
            Ok(p)  => p,
            Err(e) => {
                warn!("[gateway] bad packet: {}", e);
                let _ = egress_tx.send(error_packet(MatchError::InvalidPayload(e.to_string()))).await;
                continue;
            }
        };

        // IDENTIFY / HEARTBEAT 외에는 신원 필요
        if packet.op != client::IDENTIFY && packet.op != client::HEARTBEAT && conn.user_id.is_none() {
            let _ = egress_tx.send(error_packet(MatchError::NotAuthenticated)).await;
            continue;
        }

        if let Some(c) = conn.user_id.as_deref().and_then(|uid| state.user_hub.get(uid)) {
            c.touch();
        }

        let result = match packet.op {
            client::HEARTBEAT     => handle_heartbeat(&egress_tx, &conn, &state).await,
            client::IDENTIFY      => handle_identify(&egress_tx, &mut conn, &state, packet).await,
            client::SESSION_READY
            | client::SESSION_LEAVE
            | client::SESSION_END => handle_session_op(&egress_tx, &conn, &state, packet).await,
            unknown => {
                warn!("[gateway] unknown opcode: {}", unknown);
                send(&egress_tx, error_packet(MatchError::InvalidOpcode(unknown))).await
            }
        };

        // 요청 단위 에러는 ERROR 패킷으로 돌려주고 연결은 유지
        if let Err(e) = result {
            debug!("[gateway] handler error: {}", e);
            if send(&egress_tx, error_packet(e)).await.is_err() {
                break;
            }
        }
    }

    cleanup(&mut conn, &state, &egress_tx).await;
    rx_loop.abort();
}

// ----------------------------------------------------------------------------
// [op 핸들러들]
// ----------------------------------------------------------------------------

async fn handle_heartbeat(tx: &mpsc::Sender<String>, conn: &Conn, state: &AppState) -> Result<(), MatchError> {
    trace!("[gateway] HEARTBEAT");
    if let Some(uid) = conn.user_id.as_deref() {
        // 매칭 대기 중이 아니면 NotFound - 정상 케이스
        match state.matching.heartbeat(uid).await {
            Ok(()) | Err(MatchError::NotFound(_)) => {}
            Err(e) => warn!("[gateway] heartbeat for user={} not recorded: {}", uid, e),
        }
    }
    send(tx, make_no_data(server::HEARTBEAT_ACK)).await
}

async fn handle_identify(
    tx:     &mpsc::Sender<String>,
    conn:   &mut Conn,
    state:  &AppState,
    packet: GatewayPacket,
) -> Result<(), MatchError> {
    let payload = parse_payload::<IdentifyPayload>(packet.d)?;
    let user_id = payload.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(MatchError::InvalidPayload("empty user_id".into()));
    }
    trace!("[gateway] IDENTIFY user_id={}", user_id);

    state.user_hub.register(&user_id, tx.clone());
    conn.user_id = Some(user_id.clone());

    let session = state.sessions.by_user(&user_id).filter(|s| !s.is_ended());
    send(tx, make_packet(server::READY, ReadyPayload { user_id, session })).await
}

async fn handle_session_op(
    tx:     &mpsc::Sender<String>,
    conn:   &Conn,
    state:  &AppState,
    packet: GatewayPacket,
) -> Result<(), MatchError> {
    let user_id = conn.require_user()?;
    let op      = packet.op;
    let payload = parse_payload::<SessionOpPayload>(packet.d)?;
    trace!("[gateway] op={} user={} session={}", op, user_id, payload.session_id);

    let session = match op {
        client::SESSION_READY => state.sessions.ready_user(&payload.session_id, user_id).await?,
        client::SESSION_LEAVE => state.sessions.leave_user(&payload.session_id, user_id).await?,
        _                     => state.sessions.end(&payload.session_id, user_id).await?,
    };

    send(tx, make_packet(server::ACK, AckPayload {
        op,
        data: serde_json::to_value(SessionEventPayload::of(&session)).unwrap_or_default(),
    })).await
}

// ----------------------------------------------------------------------------
// [내부 유틸]
// ----------------------------------------------------------------------------

fn parse_payload<T: serde::de::DeserializeOwned>(
    d: Option<serde_json::Value>,
) -> Result<T, MatchError> {
    let value = d.ok_or_else(|| MatchError::InvalidPayload("missing payload".to_string()))?;
    serde_json::from_value(value).map_err(|e| MatchError::InvalidPayload(e.to_string()))
}

fn error_packet(err: MatchError) -> String {
    make_packet(server::ERROR, ErrorPayload {
        code:   to_error_code(&err),
        reason: err.to_string(),
    })
}

async fn send(tx: &mpsc::Sender<String>, json: String) -> Result<(), MatchError> {
    tx.send(json).await.map_err(|e| MatchError::InternalError(e.to_string()))
}

/// WS 종료 시 클린업 - 라우팅 해제 후 진행 중 세션에서 이탈
async fn cleanup(conn: &mut Conn, state: &AppState, tx: &mpsc::Sender<String>) {
    let Some(user_id) = conn.user_id.take() else { return };

    state.user_hub.unregister(&user_id, tx);
    // 같은 유저가 다른 연결로 재접속해 있으면 세션은 유지
    if state.user_hub.is_connected(&user_id) {
        return;
    }
    state.sessions.on_disconnect(&user_id).await;
    trace!("[gateway] cleanup user={}", user_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_packet_carries_code_and_reason() {
        let json: serde_json::Value = serde_json::from_str(&error_packet(MatchError::NotAuthenticated)).unwrap();
        assert_eq!(json["op"], server::ERROR);
        assert_eq!(json["d"]["code"], crate::protocol::error_code::NOT_AUTHENTICATED);
        assert_eq!(json["d"]["reason"], "Not authenticated");
    }

    #[test]
    fn parse_payload_rejects_missing_data() {
        let err = parse_payload::<IdentifyPayload>(None).unwrap_err();
        assert!(matches!(err, MatchError::InvalidPayload(_)));
    }
}
