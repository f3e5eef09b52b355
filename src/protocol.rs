// author: kodeholic (powered by Claude)

pub mod message;
pub mod protocol;

pub use protocol::{ws_handler, AppState};
