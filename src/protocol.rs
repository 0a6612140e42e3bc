// author: kodeholic (powered by Claude)
// 협업 게이트웨이 WebSocket 프로토콜 ({op, d} 봉투)

pub mod error_code;
pub mod message;
pub mod opcode;
pub mod protocol;

pub use protocol::{ws_handler, AppState};
