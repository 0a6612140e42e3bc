// author: kodeholic (powered by Claude)
//
// TraceHub - 매칭 라이프사이클 이벤트 실시간 관찰 버스
//
// 구조:
//   API / 워커 / TTL / sweeper / 세션 매니저
//       └── TraceHub::publish(event)
//               └── broadcast::Sender
//                       ├── SSE subscriber (pmtrace 프로세스 1)
//                       └── SSE subscriber (pmtrace 프로세스 2)
//
// 구독자가 없을 때 publish 는 그냥 drop (서버 성능에 무영향)
// 구독자가 느리면 lagged 에러 반환 - 구독자 쪽에서 처리

use std::sync::Arc;
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use crate::utils::current_timestamp;

/// 구독자가 느릴 때 최대 보유 이벤트 수 - 초과 시 오래된 이벤트 drop
const TRACE_BUF: usize = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Queued,
    Matched,
    Timeout,
    Disconnected,
    Cancelled,
    Removed,
    SessionCreated,
    SessionReady,
    SessionEnded,
}

impl TraceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceKind::Queued         => "queued",
            TraceKind::Matched        => "matched",
            TraceKind::Timeout        => "timeout",
            TraceKind::Disconnected   => "disconnected",
            TraceKind::Cancelled      => "cancelled",
            TraceKind::Removed        => "removed",
            TraceKind::SessionCreated => "session_created",
            TraceKind::SessionReady   => "session_ready",
            TraceKind::SessionEnded   => "session_ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Unix millis
    pub ts:          u64,
    pub kind:        TraceKind,
    /// 관련 user_id 목록 (matched / session 이벤트는 2명)
    pub users:       Vec<String>,
    pub matching_id: Option<String>,
    pub session_id:  Option<String>,
    pub summary:     String,
}

impl TraceEvent {
    pub fn new(kind: TraceKind, users: &[&str], summary: impl Into<String>) -> Self {
        Self {
            ts:          current_timestamp(),
            kind,
            users:       users.iter().map(|u| u.to_string()).collect(),
            matching_id: None,
            session_id:  None,
            summary:     summary.into(),
        }
    }

    pub fn with_matching_id(mut self, matching_id: &str) -> Self {
        self.matching_id = Some(matching_id.to_string());
        self
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

pub struct TraceHub {
    tx: broadcast::Sender<TraceEvent>,
}

impl TraceHub {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(TRACE_BUF);
        Arc::new(Self { tx })
    }

    /// 이벤트 publish - 구독자가 없으면 조용히 무시
    pub fn publish(&self, event: TraceEvent) {
        let _ = self.tx.send(event);
    }

    /// SSE 구독자 생성 - 각 HTTP 연결마다 호출
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscriber_no_panic() {
        let hub = TraceHub::new();
        hub.publish(TraceEvent::new(TraceKind::Queued, &["alice"], "no subscriber"));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let hub = TraceHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.publish(TraceEvent::new(TraceKind::Matched, &["alice", "bob"], "pair").with_matching_id("m-1"));

        let e1 = rx1.recv().await.unwrap();
        assert_eq!(e1.kind, TraceKind::Matched);
        assert!(e1.involves("bob"));
        assert_eq!(e1.matching_id.as_deref(), Some("m-1"));
        assert_eq!(rx2.recv().await.unwrap().kind, TraceKind::Matched);
    }

    #[test]
    fn trace_event_serializes_to_json() {
        let event = TraceEvent::new(TraceKind::SessionCreated, &["u1"], "msg").with_session_id("s-1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"session_created\""));
        assert!(json.contains("\"session_id\":\"s-1\""));
    }
}
