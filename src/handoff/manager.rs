// author: kodeholic (powered by Claude)
// SessionManager - matched 이벤트 소비 → Session 생성 → 참가자 라이프사이클
//
// 생성은 matchingId 당 정확히 1번 (bus 중복 전달은 no-op).
// 참가자 상태가 바뀔 때마다 접속 중인 두 유저에게 게이트웨이 패킷을 push 한다:
//   생성        → SESSION_CREATED
//   ready/leave → SESSION_STATE (+ all_ready 첫 성립 시 SESSION_START)
//   종료        → SESSION_ENDED

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{Session, SessionHub, UserHub};
use crate::error::{MatchError, MatchResult};
use crate::handoff::catalog::{QuestionCatalog, StaticCatalog};
use crate::matching::{MatchBus, MatchedEvent};
use crate::protocol::message::{make_packet, SessionEventPayload};
use crate::protocol::opcode::server;
use crate::trace::{TraceEvent, TraceHub, TraceKind};

pub struct SessionManager {
    hub:       Arc<SessionHub>,
    catalog:   Arc<dyn QuestionCatalog>,
    fallback:  StaticCatalog,
    user_hub:  Arc<UserHub>,
    trace_hub: Arc<TraceHub>,
}

impl SessionManager {
    pub fn new(
        hub:       Arc<SessionHub>,
        catalog:   Arc<dyn QuestionCatalog>,
        user_hub:  Arc<UserHub>,
        trace_hub: Arc<TraceHub>,
    ) -> Self {
        Self { hub, catalog, fallback: StaticCatalog::new(), user_hub, trace_hub }
    }

    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// matched 이벤트 처리. (세션, 이번 호출로 생성됐는지) 반환
    pub async fn on_matched(&self, event: &MatchedEvent) -> MatchResult<(Session, bool)> {
        if let Some(existing) = self.hub.by_matching_id(&event.matching_id) {
            debug!("[session] duplicate matched event id={}", event.matching_id);
            return Ok((existing, false));
        }

        let question_id = match self.catalog.pick(event.difficulty, &event.topic).await {
            Ok(q) => q,
            Err(e) => {
                warn!("[session] catalog pick failed, using fallback: {}", e);
                self.fallback.pick_local(event.difficulty, &event.topic)
            }
        };

        let session = Session::new(
            &event.matching_id,
            &question_id,
            event.difficulty,
            &event.topic,
            [event.users[0].as_str(), event.users[1].as_str()],
        );

        // 카탈로그 호출 중 같은 이벤트가 먼저 생성했으면 그 세션이 이긴다
        let (session, created) = self.hub.create(session);
        if created {
            self.push(&session, server::SESSION_CREATED).await;
            self.trace_hub.publish(
                TraceEvent::new(
                    TraceKind::SessionCreated,
                    &[event.users[0].as_str(), event.users[1].as_str()],
                    format!("question={}", session.question_id),
                )
                .with_matching_id(&session.matching_id)
                .with_session_id(&session.id),
            );
        }
        Ok((session, created))
    }

    pub async fn ready_user(&self, session_id: &str, user_id: &str) -> MatchResult<Session> {
        let (started, session) = self.hub.update(session_id, |s| s.ready_user(user_id))?;
        info!("[session] ready id={} user={}", session_id, user_id);

        self.push(&session, server::SESSION_STATE).await;
        self.trace_hub.publish(
            TraceEvent::new(TraceKind::SessionReady, &[user_id], format!("all_ready={}", session.all_ready()))
                .with_session_id(session_id),
        );
        if started {
            info!("[session] started id={}", session_id);
            self.push(&session, server::SESSION_START).await;
        }
        Ok(session)
    }

    pub async fn leave_user(&self, session_id: &str, user_id: &str) -> MatchResult<Session> {
        let (terminated, session) = self.hub.update(session_id, |s| s.leave_user(user_id))?;
        info!("[session] left id={} user={}", session_id, user_id);

        self.push(&session, server::SESSION_STATE).await;
        if terminated {
            self.on_terminated(&session).await;
        }
        Ok(session)
    }

    pub async fn end(&self, session_id: &str, user_id: &str) -> MatchResult<Session> {
        let (terminated, session) = self.hub.update(session_id, |s| s.end(user_id))?;
        if terminated {
            self.on_terminated(&session).await;
        }
        Ok(session)
    }

    pub fn all_ready(&self, session_id: &str) -> MatchResult<bool> {
        self.hub.get(session_id)
            .map(|s| s.all_ready())
            .ok_or_else(|| MatchError::SessionNotFound(session_id.to_string()))
    }

    pub fn by_user(&self, user_id: &str) -> Option<Session> {
        self.hub.by_user(user_id)
    }

    pub fn by_matching_id(&self, matching_id: &str) -> Option<Session> {
        self.hub.by_matching_id(matching_id)
    }

    /// 게이트웨이 연결 종료 - 진행 중인 세션에서 이탈 처리
    pub async fn on_disconnect(&self, user_id: &str) {
        let Some(session) = self.hub.by_user(user_id) else { return };
        if session.is_ended() {
            return;
        }
        if let Err(e) = self.leave_user(&session.id, user_id).await {
            debug!("[session] leave on disconnect ignored user={}: {}", user_id, e);
        }
    }

    async fn on_terminated(&self, session: &Session) {
        info!("[session] ended id={} reason={:?} by={:?}",
            session.id, session.termination_reason, session.ended_by);
        self.push(session, server::SESSION_ENDED).await;

        let users = session.participant_ids();
        let refs: Vec<&str> = users.iter().map(String::as_str).collect();
        self.trace_hub.publish(
            TraceEvent::new(TraceKind::SessionEnded, &refs, session.termination_reason.map_or("", |r| r.as_str()))
                .with_matching_id(&session.matching_id)
                .with_session_id(&session.id),
        );
    }

    async fn push(&self, session: &Session, op: u8) {
        let json = make_packet(op, SessionEventPayload::of(session));
        self.user_hub.send_to(&session.participant_ids(), &json).await;
    }
}

// ----------------------------------------------------------------------------
// [루프] matched 이벤트 소비자
// ----------------------------------------------------------------------------

pub async fn run_session_consumer(
    manager:      Arc<SessionManager>,
    bus:          Arc<dyn MatchBus>,
    idle_poll:    Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("[session] Consumer started (idle_poll={:?})", idle_poll);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match bus.consume().await {
            Ok(Some(event)) => {
                if let Err(e) = manager.on_matched(&event).await {
                    warn!("[session] matched event id={} failed: {}", event.matching_id, e);
                    if let Err(e) = bus.requeue(&event).await {
                        warn!("[session] requeue failed id={}: {}", event.matching_id, e);
                    }
                    idle_poll
                } else {
                    continue;
                }
            }
            Ok(None) => idle_poll,
            Err(e) => {
                warn!("[session] bus consume failed: {}", e);
                idle_poll.max(Duration::from_millis(200))
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("[session] Consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Difficulty;
    use async_trait::async_trait;

    struct BrokenCatalog;

    #[async_trait]
    impl QuestionCatalog for BrokenCatalog {
        async fn pick(&self, _: Difficulty, _: &str) -> MatchResult<String> {
            Err(MatchError::Catalog("down".into()))
        }
    }

    fn manager(catalog: Arc<dyn QuestionCatalog>) -> SessionManager {
        SessionManager::new(Arc::new(SessionHub::new()), catalog, Arc::new(UserHub::new()), TraceHub::new())
    }

    fn event(id: &str) -> MatchedEvent {
        MatchedEvent {
            matching_id: id.to_string(),
            difficulty:  Difficulty::Medium,
            topic:       "Graph".to_string(),
            users:       ["alice".to_string(), "bob".to_string()],
            matched_at:  0,
        }
    }

    #[tokio::test]
    async fn duplicate_event_creates_one_session() {
        let m = manager(Arc::new(StaticCatalog::new()));
        let (s1, created1) = m.on_matched(&event("m-1")).await.unwrap();
        let (s2, created2) = m.on_matched(&event("m-1")).await.unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(s1.id, s2.id);
        assert_eq!(m.hub().count(), 1);
    }

    #[tokio::test]
    async fn catalog_failure_falls_back() {
        let m = manager(Arc::new(BrokenCatalog));
        let (s, _) = m.on_matched(&event("m-1")).await.unwrap();
        assert_eq!(s.question_id, "q-medium-graph");
    }

    #[tokio::test]
    async fn connected_participants_get_pushed() {
        let m = manager(Arc::new(StaticCatalog::new()));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        m.user_hub.register("alice", tx);

        let (s, _) = m.on_matched(&event("m-1")).await.unwrap();
        let created: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(created["op"], server::SESSION_CREATED);
        assert_eq!(created["d"]["session"]["id"], s.id.as_str());

        m.ready_user(&s.id, "alice").await.unwrap();
        m.ready_user(&s.id, "bob").await.unwrap();
        let ops: Vec<u64> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|p| serde_json::from_str::<serde_json::Value>(&p.unwrap()).unwrap()["op"].as_u64().unwrap())
            .collect();
        assert_eq!(ops, vec![server::SESSION_STATE as u64, server::SESSION_STATE as u64, server::SESSION_START as u64]);
        assert!(m.all_ready(&s.id).unwrap());
    }

    #[tokio::test]
    async fn disconnect_leaves_active_session() {
        let m = manager(Arc::new(StaticCatalog::new()));
        let (s, _) = m.on_matched(&event("m-1")).await.unwrap();
        m.on_disconnect("alice").await;
        m.on_disconnect("bob").await;
        let s = m.hub().get(&s.id).unwrap();
        assert!(s.is_ended());
        assert_eq!(s.termination_reason, Some(crate::core::TerminationReason::AllLeft));
    }
}
