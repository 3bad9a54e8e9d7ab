//! Wire types for the Conversational AI WebSocket.

use serde::{Deserialize, Serialize};

/// Messages sent to the agent.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ClientMessage {
    Typed(TypedClientMessage),
    /// One chunk of caller audio, base64 encoded.
    UserAudio { user_audio_chunk: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedClientMessage {
    /// Opens the conversation. Must be the first message on the socket.
    ConversationInitiationClientData,
    /// Answers a server `ping`.
    Pong { event_id: u64 },
}

impl ClientMessage {
    pub fn initiation() -> Self {
        Self::Typed(TypedClientMessage::ConversationInitiationClientData)
    }

    pub fn pong(event_id: u64) -> Self {
        Self::Typed(TypedClientMessage::Pong { event_id })
    }

    pub fn user_audio(audio_base_64: String) -> Self {
        Self::UserAudio {
            user_audio_chunk: audio_base_64,
        }
    }
}

/// Messages received from the agent.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadataEvent,
    },
    Audio {
        audio_event: AudioEvent,
    },
    Interruption {
        interruption_event: InterruptionEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InitiationMetadataEvent {
    pub conversation_id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub audio_base_64: String,
    pub event_id: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InterruptionEvent {
    pub event_id: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PingEvent {
    pub event_id: u64,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

/// Response body of the signed-URL endpoint.
#[derive(Deserialize, Debug)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}
