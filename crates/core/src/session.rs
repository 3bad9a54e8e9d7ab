//! Agent session contract.
//!
//! An agent session is the remote conversational service bound to one call.
//! It is created with an [`AudioInterface`] and drives it for its whole
//! lifetime: installing the input callback on start, pushing synthesized audio
//! through `output`, and flushing the caller leg through `interrupt` when the
//! caller barges in.

use crate::audio::AudioInterface;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Observer for text emitted by the session (agent replies, user transcripts).
pub type TextObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional observers a session reports text events to.
#[derive(Clone, Default)]
pub struct SessionObservers {
    pub agent_response: Option<TextObserver>,
    pub user_transcript: Option<TextObserver>,
}

impl SessionObservers {
    pub fn agent_response(&self, text: &str) {
        if let Some(observer) = &self.agent_response {
            observer(text);
        }
    }

    pub fn user_transcript(&self, text: &str) {
        if let Some(observer) = &self.user_transcript {
            observer(text);
        }
    }
}

impl std::fmt::Debug for SessionObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionObservers")
            .field("agent_response", &self.agent_response.is_some())
            .field("user_transcript", &self.user_transcript.is_some())
            .finish()
    }
}

/// Errors raised by an agent session.
#[derive(Debug, Error)]
pub enum AgentSessionError {
    #[error("Failed to connect to agent: {0}")]
    Connect(String),
    #[error("Agent protocol error: {0}")]
    Protocol(String),
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Session task failed: {0}")]
    Task(String),
}

/// A running (or startable) conversation with a voice agent.
#[async_trait]
pub trait AgentSession: Send {
    /// Opens the conversation and begins exchanging audio.
    async fn start_session(&mut self) -> Result<(), AgentSessionError>;

    /// Requests termination. Returns without waiting; safe to call repeatedly.
    fn end_session(&self);

    /// Waits until the session has fully stopped and returns the provider's
    /// conversation identifier, if one was assigned.
    async fn wait_for_session_end(&mut self) -> Result<Option<String>, AgentSessionError>;
}

/// Builds one agent session per call.
pub trait AgentConnector: Send + Sync {
    fn connect(
        &self,
        audio: Arc<dyn AudioInterface>,
        observers: SessionObservers,
    ) -> Box<dyn AgentSession>;
}
