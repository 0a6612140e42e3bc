// author: kodeholic (powered by Claude)
// Session - 매칭된 두 유저의 협업 세션 상태 머신
//
// 참가자 상태 전이:
//   waiting ──ready──▶ ready ──leave──▶ left ──ready──▶ ready (재입장)
//      └──────────────────end──────────────────▶ end (세션 종료)
//
// all_ready(): waiting 상태 참가자가 하나도 없으면 true
// 종료 조건: 누군가 end 호출 (ended_by_user) 또는 두 명 모두 left (all_left)
// 종료된 세션은 다시 열리지 않는다.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, trace};

use crate::core::status::Difficulty;
use crate::error::{MatchError, MatchResult};
use crate::utils::current_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantState {
    Waiting,
    Ready,
    Left,
    End,
}

impl ParticipantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Waiting => "waiting",
            ParticipantState::Ready   => "ready",
            ParticipantState::Left    => "left",
            ParticipantState::End     => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    EndedByUser,
    AllLeft,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::EndedByUser => "ended_by_user",
            TerminationReason::AllLeft     => "all_left",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParticipant {
    pub user_id:    String,
    pub state:      ParticipantState,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id:                 String,
    pub matching_id:        String,
    pub question_id:        String,
    pub difficulty:         Difficulty,
    pub topic:              String,
    pub participants:       Vec<SessionParticipant>,
    pub created_at:         u64,
    /// all_ready 가 처음 true 가 된 시각
    pub started_at:         Option<u64>,
    pub ended_at:           Option<u64>,
    pub termination_reason: Option<TerminationReason>,
    pub ended_by:           Option<String>,
}

impl Session {
    pub fn new(
        matching_id: &str,
        question_id: &str,
        difficulty:  Difficulty,
        topic:       &str,
        users:       [&str; 2],
    ) -> Self {
        let now = current_timestamp();
        Self {
            id:           uuid::Uuid::new_v4().to_string(),
            matching_id:  matching_id.to_string(),
            question_id:  question_id.to_string(),
            difficulty,
            topic:        topic.to_string(),
            participants: users.iter()
                .map(|u| SessionParticipant {
                    user_id:    u.to_string(),
                    state:      ParticipantState::Waiting,
                    updated_at: now,
                })
                .collect(),
            created_at:         now,
            started_at:         None,
            ended_at:           None,
            termination_reason: None,
            ended_by:           None,
        }
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.user_id.clone()).collect()
    }

    pub fn participant(&self, user_id: &str) -> Option<&SessionParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn all_ready(&self) -> bool {
        self.participants.iter().all(|p| p.state != ParticipantState::Waiting)
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    fn participant_mut(&mut self, user_id: &str) -> MatchResult<&mut SessionParticipant> {
        let session_id = self.id.clone();
        self.participants.iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| MatchError::NotParticipant { session_id, user_id: user_id.to_string() })
    }

    fn ensure_open(&self) -> MatchResult<()> {
        if self.is_ended() {
            return Err(MatchError::SessionEnded(self.id.clone()));
        }
        Ok(())
    }

    /// 참가자 입장. all_ready 가 이번 호출로 처음 true 가 됐으면 true 반환
    pub fn ready_user(&mut self, user_id: &str) -> MatchResult<bool> {
        self.ensure_open()?;
        let was_ready = self.all_ready();
        let now = current_timestamp();

        let p = self.participant_mut(user_id)?;
        if p.state != ParticipantState::Ready {
            p.state = ParticipantState::Ready;
            p.updated_at = now;
        }

        let started = !was_ready && self.all_ready() && self.started_at.is_none();
        if started {
            self.started_at = Some(now);
        }
        Ok(started)
    }

    /// 참가자 이탈. 두 명 모두 left 가 되어 세션이 종료됐으면 true 반환
    pub fn leave_user(&mut self, user_id: &str) -> MatchResult<bool> {
        self.ensure_open()?;
        let now = current_timestamp();

        let p = self.participant_mut(user_id)?;
        if p.state == ParticipantState::Left {
            return Ok(false);
        }
        p.state = ParticipantState::Left;
        p.updated_at = now;

        if self.participants.iter().all(|p| p.state == ParticipantState::Left) {
            self.terminate(TerminationReason::AllLeft, None, now);
            return Ok(true);
        }
        Ok(false)
    }

    /// 명시적 종료. 이미 종료된 세션이면 false (no-op)
    pub fn end(&mut self, user_id: &str) -> MatchResult<bool> {
        if !self.has_participant(user_id) {
            return Err(MatchError::NotParticipant {
                session_id: self.id.clone(),
                user_id:    user_id.to_string(),
            });
        }
        if self.is_ended() {
            return Ok(false);
        }
        let now = current_timestamp();
        let p = self.participant_mut(user_id)?;
        p.state = ParticipantState::End;
        p.updated_at = now;
        self.terminate(TerminationReason::EndedByUser, Some(user_id), now);
        Ok(true)
    }

    fn terminate(&mut self, reason: TerminationReason, by: Option<&str>, now: u64) {
        self.ended_at = Some(now);
        self.termination_reason = Some(reason);
        self.ended_by = by.map(str::to_string);
    }
}

// ----------------------------------------------------------------------------
// [SessionHub] 세션 저장소 + 인덱스 (session id / matchingId / 참가자)
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SessionIndex {
    sessions: HashMap<String, Session>,
    by_match: HashMap<String, String>,
    /// 참가자 → 가장 최근 세션 id
    by_user:  HashMap<String, String>,
}

pub struct SessionHub {
    inner: RwLock<SessionIndex>,
}

impl SessionHub {
    pub fn new() -> Self {
        trace!("Initializing SessionHub");
        Self { inner: RwLock::new(SessionIndex::default()) }
    }

    /// matchingId 당 1개만 생성. 이미 있으면 기존 세션과 false 반환
    pub fn create(&self, session: Session) -> (Session, bool) {
        let mut idx = self.inner.write().unwrap();

        if let Some(existing) = idx.by_match.get(&session.matching_id)
            .and_then(|sid| idx.sessions.get(sid))
        {
            return (existing.clone(), false);
        }

        for uid in session.participant_ids() {
            idx.by_user.insert(uid, session.id.clone());
        }
        idx.by_match.insert(session.matching_id.clone(), session.id.clone());
        idx.sessions.insert(session.id.clone(), session.clone());

        info!("[session] created id={} match={}", session.id, session.matching_id);
        (session, true)
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.read().unwrap().sessions.get(session_id).cloned()
    }

    pub fn by_matching_id(&self, matching_id: &str) -> Option<Session> {
        let idx = self.inner.read().unwrap();
        idx.by_match.get(matching_id).and_then(|sid| idx.sessions.get(sid)).cloned()
    }

    pub fn by_user(&self, user_id: &str) -> Option<Session> {
        let idx = self.inner.read().unwrap();
        idx.by_user.get(user_id).and_then(|sid| idx.sessions.get(sid)).cloned()
    }

    /// 세션 하나를 락 안에서 변경하고 변경 후 사본을 함께 반환
    pub fn update<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> MatchResult<R>,
    ) -> MatchResult<(R, Session)> {
        let mut idx = self.inner.write().unwrap();
        let session = idx.sessions.get_mut(session_id)
            .ok_or_else(|| MatchError::SessionNotFound(session_id.to_string()))?;
        let r = f(session)?;
        Ok((r, session.clone()))
    }

    pub fn all(&self) -> Vec<Session> {
        let mut list: Vec<Session> = self.inner.read().unwrap().sessions.values().cloned().collect();
        list.sort_by_key(|s| s.created_at);
        list
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().sessions.len()
    }

    pub fn count_active(&self) -> usize {
        self.inner.read().unwrap().sessions.values().filter(|s| !s.is_ended()).count()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("m-1", "q-1", Difficulty::Easy, "DP", ["alice", "bob"])
    }

    #[test]
    fn all_ready_only_after_both_ready() {
        let mut s = session();
        assert!(!s.all_ready());
        assert!(!s.ready_user("alice").unwrap());
        assert!(!s.all_ready());
        assert!(s.ready_user("bob").unwrap());
        assert!(s.all_ready());
        assert!(s.started_at.is_some());
    }

    #[test]
    fn all_ready_stays_true_after_leave() {
        let mut s = session();
        s.ready_user("alice").unwrap();
        s.ready_user("bob").unwrap();
        assert!(!s.leave_user("alice").unwrap());
        assert!(s.all_ready());
        // 재입장은 시작 이벤트를 다시 만들지 않는다
        assert!(!s.ready_user("alice").unwrap());
    }

    #[test]
    fn both_left_terminates_with_all_left() {
        let mut s = session();
        s.leave_user("alice").unwrap();
        assert!(!s.is_ended());
        assert!(s.leave_user("bob").unwrap());
        assert_eq!(s.termination_reason, Some(TerminationReason::AllLeft));
        assert!(matches!(s.ready_user("alice"), Err(MatchError::SessionEnded(_))));
    }

    #[test]
    fn end_terminates_once() {
        let mut s = session();
        assert!(s.end("bob").unwrap());
        assert_eq!(s.termination_reason, Some(TerminationReason::EndedByUser));
        assert_eq!(s.ended_by.as_deref(), Some("bob"));
        assert_eq!(s.participant("bob").unwrap().state, ParticipantState::End);
        assert!(!s.end("alice").unwrap());
        assert_eq!(s.ended_by.as_deref(), Some("bob"));
    }

    #[test]
    fn stranger_is_rejected() {
        let mut s = session();
        assert!(matches!(s.ready_user("mallory"), Err(MatchError::NotParticipant { .. })));
        assert!(matches!(s.end("mallory"), Err(MatchError::NotParticipant { .. })));
    }

    #[test]
    fn hub_create_is_idempotent_per_matching_id() {
        let hub = SessionHub::new();
        let (first, created) = hub.create(session());
        assert!(created);
        let (second, created) = hub.create(session());
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(hub.count(), 1);
        assert_eq!(hub.by_user("bob").unwrap().id, first.id);
        assert_eq!(hub.by_matching_id("m-1").unwrap().id, first.id);
    }

    #[test]
    fn hub_update_applies_in_place() {
        let hub = SessionHub::new();
        let (s, _) = hub.create(session());
        let (started, after) = hub.update(&s.id, |s| s.ready_user("alice")).unwrap();
        assert!(!started);
        assert_eq!(after.participant("alice").unwrap().state, ParticipantState::Ready);
        assert!(matches!(hub.update("nope", |s| s.end("alice")), Err(MatchError::SessionNotFound(_))));
        assert_eq!(hub.count_active(), 1);
    }
}
