//! WebSocket Debate Channel
//!
//! - `protocol`: the JSON messages the server pushes to the browser.
//! - `session`: the connection lifecycle, from session validation to the verdict.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
