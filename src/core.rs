// author: kodeholic (powered by Claude)
// 네트워크 로직과 분리된 순수 상태 관리 모듈
//
//   status  - StatusRegistry (유저별 매칭 상태 + lease)
//   queue   - EntryQueue (워커 입력 job)
//   pool    - MatchingPool (버킷 큐 + FCFS)
//   session - Session / SessionHub (핸드오프 이후)
//   user    - UserHub (게이트웨이 WS 연결)

pub mod pool;
pub mod queue;
pub mod session;
pub mod status;
pub mod user;

pub use pool::{BucketInfo, MatchingPool, PoolEntry};
pub use queue::{ClearReason, EntryQueue, EntryQueueJob};
pub use session::{ParticipantState, Session, SessionHub, SessionParticipant, TerminationReason};
pub use status::{Difficulty, MatchStatus, StatusEntry, StatusRegistry};
pub use user::{BroadcastTx, Connection, UserHub};
