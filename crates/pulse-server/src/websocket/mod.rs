//! `WebSocket` session handling.

pub mod handler;
pub mod heartbeat;
pub mod session;

pub use session::run_ws_session;
