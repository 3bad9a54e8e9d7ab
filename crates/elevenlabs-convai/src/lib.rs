//! Client for the ElevenLabs Conversational AI WebSocket.
//!
//! [`Conversation`] implements [`callbridge_core::AgentSession`]: it streams
//! caller audio to the agent and plays the agent's replies through whatever
//! [`callbridge_core::AudioInterface`] it was built with.

mod client;
pub mod messages;

pub use client::{
    Conversation, ConversationConfig, DEFAULT_API_BASE, DEFAULT_WS_BASE, ElevenLabsConnector,
};
