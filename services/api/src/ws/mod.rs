//! Twilio Media Stream Bridge
//!
//! This module carries one phone call's audio between Twilio and a voice
//! agent. It is structured into submodules:
//!
//! - `protocol`: Decodes and encodes the JSON frames of the media-stream socket.
//! - `call`: Per-call state shared by the reader, the bridge and the writer.
//! - `bridge`: The agent's audio interface over the media stream.
//! - `writer`: The single task that owns the socket's write half.
//! - `retry`: The retry-once combinator used on both directions.
//! - `session`: The connection lifecycle, from upgrade to teardown.

pub mod bridge;
pub mod call;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod writer;

pub use session::ws_handler;
