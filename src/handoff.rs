// author: kodeholic (powered by Claude)
// 세션 핸드오프 - matched 이벤트를 협업 세션으로 승격

pub mod catalog;
pub mod manager;

pub use catalog::{HttpCatalog, QuestionCatalog, StaticCatalog};
pub use manager::{run_session_consumer, SessionManager};
