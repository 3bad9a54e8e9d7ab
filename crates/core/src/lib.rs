//! Shared contracts for the call bridge.
//!
//! The crates in this workspace meet at the types defined here: the audio
//! transport capability set an agent session drives, the agent session itself,
//! and the named tool handlers the agent platform calls back into.

pub mod audio;
pub mod session;
pub mod tools;

pub use audio::{AudioInterface, InputCallback};
pub use session::{
    AgentConnector, AgentSession, AgentSessionError, SessionObservers, TextObserver,
};
pub use tools::{ToolError, ToolHandler, ToolRegistry};
