// author: kodeholic (powered by Claude)
// 매칭 서브시스템
//
//   API ──▶ MatchService ──▶ EntryQueue ──▶ MatchingWorker ──▶ MatchingPool
//                                                   └──▶ MatchAnnouncer ──▶ MatchBus
//   TtlHandler / DisconnectSweeper ──▶ clear_user job + StatusRegistry

pub mod announcer;
pub mod service;
pub mod sweeper;
pub mod ttl;
pub mod worker;

pub use announcer::{MatchAnnouncer, MatchBus, MatchedEvent, StoreBus};
pub use service::{MatchService, StatusView};
pub use sweeper::{run_disconnect_sweeper, DisconnectSweeper};
pub use ttl::{run_ttl_listener, TtlHandler, TtlOutcome};
pub use worker::{run_matching_worker, JobOutcome, MatchingWorker};
