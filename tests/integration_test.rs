// author: kodeholic (powered by Claude)

use futures_util::{SinkExt, StreamExt};
use pair_match::config::MatchConfig;
use pair_match::Services;
use portpicker::pick_unused_port;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

// ----------------------------------------------------------------------------
// [테스트 헬퍼]
// ----------------------------------------------------------------------------

struct TestServer {
    addr:      String,
    http:      reqwest::Client,
    // drop 되면 상주 루프가 종료된다
    _shutdown: watch::Sender<bool>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn request_match(&self, user_id: &str, difficulty: &str, topics: &[&str]) -> reqwest::Response {
        self.http.post(self.url("/match/request"))
            .header("x-user-id", user_id)
            .json(&json!({ "difficulty": difficulty, "topics": topics }))
            .send().await.expect("요청 실패")
    }

    async fn get_as(&self, user_id: &str, path: &str) -> reqwest::Response {
        self.http.get(self.url(path))
            .header("x-user-id", user_id)
            .send().await.expect("요청 실패")
    }
}

async fn spawn_test_server() -> TestServer {
    let port = pick_unused_port().expect("사용 가능한 포트를 찾을 수 없습니다.");
    let addr = format!("127.0.0.1:{}", port);

    let config = MatchConfig {
        lease_tick:       Duration::from_millis(10),
        worker_idle_poll: Duration::from_millis(5),
        bus_idle_poll:    Duration::from_millis(5),
        ..MatchConfig::default()
    };
    let (services, memory) = Services::in_memory(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(pair_match::store::memory::run_expiry_ticker(
        memory, services.config.lease_tick, shutdown_rx.clone(),
    ));
    services.spawn_loops(&shutdown_rx);
    let app = services.router();

    let listener = TcpListener::bind(&addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    TestServer { addr, http: reqwest::Client::new(), _shutdown: shutdown_tx }
}

type WsTx = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsRx = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

async fn connect(addr: &str) -> (WsTx, WsRx) {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.expect("WS 연결 실패");
    ws.split()
}

async fn send(tx: &mut WsTx, payload: Value) {
    tx.send(Message::Text(payload.to_string().into())).await.expect("전송 실패");
}

async fn recv(rx: &mut WsRx) -> Value {
    let next = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.next().await.expect("수신 실패").expect("메시지 에러") {
                Message::Text(t) => return serde_json::from_str::<Value>(&t).expect("JSON 파싱 실패"),
                _ => continue,
            }
        }
    });
    next.await.expect("2초 안에 패킷이 도착해야 합니다.")
}

/// 기대 op 가 나올 때까지 다른 push 는 건너뛴다
async fn recv_op(rx: &mut WsRx, expected_op: u64) -> Value {
    loop {
        let packet = recv(rx).await;
        if packet["op"].as_u64() == Some(expected_op) {
            return packet;
        }
    }
}

fn assert_op(packet: &Value, expected_op: u64, label: &str) {
    assert_eq!(
        packet["op"].as_u64().unwrap(), expected_op,
        "{}: 기대 op={}, 실제={}", label, expected_op, packet["op"]
    );
}

/// HELLO → IDENTIFY → READY 까지 공통 처리
async fn identify(tx: &mut WsTx, rx: &mut WsRx, user_id: &str) -> Value {
    recv(rx).await; // HELLO
    send(tx, json!({ "op": 3, "d": { "user_id": user_id } })).await;
    let ready = recv(rx).await;
    assert_op(&ready, 4, "READY");
    ready
}

// ----------------------------------------------------------------------------
// [HTTP] 매칭 요청 라이프사이클
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = spawn_test_server().await;

    let resp = server.http.post(server.url("/match/request"))
        .json(&json!({ "difficulty": "Easy", "topics": ["DP"] }))
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server.http.get(server.url("/match/status")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_status_cancel() {
    let server = spawn_test_server().await;

    let resp = server.request_match("alice", "Medium", &["Graph", "DP"]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "queued");
    assert!(body["sessionKey"].as_i64().unwrap() > 0);

    // 대기 중 재요청 → 400
    let resp = server.request_match("alice", "Medium", &["Graph"]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let view: Value = server.get_as("alice", "/match/status").await.json().await.unwrap();
    assert!(view["status"] == "waiting" || view["status"] == "matching", "실제 상태: {}", view);
    assert!(view["remainingTime"].as_u64().unwrap() > 0);

    let resp = server.http.post(server.url("/match/heartbeat"))
        .header("x-user-id", "alice")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.http.delete(server.url("/match/cancel"))
        .header("x-user-id", "alice")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let view: Value = server.get_as("alice", "/match/status").await.json().await.unwrap();
    assert_eq!(view["status"], "cancelled");
    assert!(view["remainingTime"].is_null());

    // 이미 취소됨 → 400
    let resp = server.http.delete(server.url("/match/cancel"))
        .header("x-user-id", "alice")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let server = spawn_test_server().await;

    assert_eq!(server.request_match("bob", "Impossible", &["DP"]).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.request_match("bob", "Easy", &[]).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.request_match("bob", "Easy", &["  "]).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.get_as("bob", "/match/status").await.status(), StatusCode::NOT_FOUND);
    let resp = server.http.post(server.url("/match/heartbeat"))
        .header("x-user-id", "bob")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ----------------------------------------------------------------------------
// [HTTP + WS] 매칭 → 세션 핸드오프 → ready
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_match_to_session_handoff() {
    let server = spawn_test_server().await;

    let (mut tx_a, mut rx_a) = connect(&server.addr).await;
    let ready = identify(&mut tx_a, &mut rx_a, "alice").await;
    assert!(ready["d"]["session"].is_null());
    let (mut tx_b, mut rx_b) = connect(&server.addr).await;
    identify(&mut tx_b, &mut rx_b, "bob").await;

    assert_eq!(server.request_match("alice", "Easy", &["Array", "DP"]).await.status(), StatusCode::OK);
    assert_eq!(server.request_match("bob", "Easy", &["DP"]).await.status(), StatusCode::OK);

    // 두 유저 모두 SESSION_CREATED 수신
    let created_a = recv_op(&mut rx_a, 120).await;
    let created_b = recv_op(&mut rx_b, 120).await;
    let session_id = created_a["d"]["session"]["id"].as_str().unwrap().to_string();
    assert_eq!(created_b["d"]["session"]["id"], session_id.as_str());
    assert_eq!(created_a["d"]["session"]["topic"], "DP");
    assert_eq!(created_a["d"]["all_ready"], false);

    // 매칭 상태 조회 - matched + matchingId
    let view: Value = server.get_as("alice", "/match/status").await.json().await.unwrap();
    assert_eq!(view["status"], "matched");
    let matching_id = view["matchingId"].as_str().unwrap().to_string();

    let by_match: Value = server.http.get(server.url(&format!("/session/by-match/{}", matching_id)))
        .send().await.unwrap().json().await.unwrap();
    assert_eq!(by_match["id"], session_id.as_str());

    // alice ready (WS) → ACK, 아직 all_ready 아님
    send(&mut tx_a, json!({ "op": 40, "d": { "session_id": session_id } })).await;
    let ack = recv_op(&mut rx_a, 200).await;
    assert_eq!(ack["d"]["op"], 40);
    assert_eq!(ack["d"]["data"]["all_ready"], false);

    // bob ready (HTTP) → 두 유저 모두 SESSION_START
    let resp = server.http.post(server.url(&format!("/session/{}/ready", session_id)))
        .header("x-user-id", "bob")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    recv_op(&mut rx_a, 122).await;
    recv_op(&mut rx_b, 122).await;

    let session: Value = server.http.get(server.url("/session/by-user/bob"))
        .send().await.unwrap().json().await.unwrap();
    assert!(session["startedAt"].as_u64().is_some());

    // 제3자 end → 403
    let resp = server.http.post(server.url(&format!("/session/{}/end", session_id)))
        .header("x-user-id", "mallory")
        .send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // alice end → 두 유저에게 SESSION_ENDED
    send(&mut tx_a, json!({ "op": 42, "d": { "session_id": session_id } })).await;
    let ended = recv_op(&mut rx_b, 123).await;
    assert_eq!(ended["d"]["session"]["terminationReason"], "ended_by_user");
    assert_eq!(ended["d"]["session"]["endedBy"], "alice");
}

// ----------------------------------------------------------------------------
// [WS] 게이트웨이 기본 동작
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_gateway_hello_and_heartbeat() {
    let server = spawn_test_server().await;
    let (mut tx, mut rx) = connect(&server.addr).await;

    let hello = recv(&mut rx).await;
    assert_op(&hello, 0, "HELLO");
    assert!(hello["d"]["heartbeat_interval"].as_u64().unwrap() > 0);

    send(&mut tx, json!({ "op": 3, "d": { "user_id": "carol" } })).await;
    let ready = recv(&mut rx).await;
    assert_op(&ready, 4, "READY");
    assert_eq!(ready["d"]["user_id"], "carol");

    send(&mut tx, json!({ "op": 1, "d": null })).await;
    assert_op(&recv(&mut rx).await, 2, "HEARTBEAT_ACK");
}

#[tokio::test]
async fn test_gateway_errors() {
    let server = spawn_test_server().await;
    let (mut tx, mut rx) = connect(&server.addr).await;
    recv(&mut rx).await; // HELLO

    // 인증 없이 세션 op → 1000
    send(&mut tx, json!({ "op": 40, "d": { "session_id": "nope" } })).await;
    let err = recv(&mut rx).await;
    assert_op(&err, 201, "ERROR");
    assert_eq!(err["d"]["code"], 1000, "NotAuthenticated 에러여야 합니다.");

    send(&mut tx, json!({ "op": 3, "d": { "user_id": "dave" } })).await;
    recv(&mut rx).await; // READY

    // 없는 세션 → 3000
    send(&mut tx, json!({ "op": 40, "d": { "session_id": "nope" } })).await;
    let err = recv(&mut rx).await;
    assert_eq!(err["d"]["code"], 3000, "SessionNotFound 에러여야 합니다.");

    // 알 수 없는 op → 1003
    send(&mut tx, json!({ "op": 99, "d": null })).await;
    let err = recv(&mut rx).await;
    assert_eq!(err["d"]["code"], 1003, "InvalidOpcode 에러여야 합니다.");
}

// ----------------------------------------------------------------------------
// [Admin]
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_admin_views_and_force_clear() {
    let server = spawn_test_server().await;

    server.request_match("erin", "Hard", &["Graph"]).await;
    server.request_match("frank", "Hard", &["Tree"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status: Value = server.http.get(server.url("/admin/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["user_count"], 2);
    assert_eq!(status["fcfs_len"], 2);

    let pool: Value = server.http.get(server.url("/admin/pool")).send().await.unwrap().json().await.unwrap();
    assert_eq!(pool["fcfs"][0]["user_id"], "erin");
    assert_eq!(pool["buckets"].as_array().unwrap().len(), 2);

    let detail: Value = server.http.get(server.url("/admin/users/frank")).send().await.unwrap().json().await.unwrap();
    assert_eq!(detail["entry"]["status"], "waiting");
    assert_eq!(detail["queue_position"], 2);
    assert_eq!(detail["connected"], false);

    let resp = server.http.post(server.url("/admin/clear/erin")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["was"], "waiting");

    assert_eq!(server.get_as("erin", "/match/status").await.status(), StatusCode::NOT_FOUND);
    let pool: Value = server.http.get(server.url("/admin/pool")).send().await.unwrap().json().await.unwrap();
    assert_eq!(pool["fcfs"].as_array().unwrap().len(), 1);
    assert_eq!(pool["fcfs"][0]["position"], 1);

    let resp = server.http.post(server.url("/admin/clear/nobody")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
