//! Request and response bodies of the HTTP API.
//!
//! These types drive both (de)serialization and the OpenAPI document
//! generated with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct RootResponse {
    #[schema(example = "Twilio-ElevenLabs Integration Server")]
    pub message: String,
}

/// Form fields posted by Twilio when a call comes in. Only the ones we log.
#[derive(Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct InboundCallForm {
    #[serde(rename = "CallSid", default = "unknown")]
    #[schema(example = "CA1234567890abcdef")]
    pub call_sid: String,
    #[serde(rename = "From", default = "unknown")]
    #[schema(example = "+15551234567")]
    pub from: String,
}

impl Default for InboundCallForm {
    fn default() -> Self {
        Self {
            call_sid: unknown(),
            from: unknown(),
        }
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

/// Body returned to the agent platform when a tool call fails.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ToolFailure {
    #[schema(example = false)]
    pub success: bool,
    #[schema(example = "Unknown tool: lookup_order")]
    pub error: String,
}

impl ToolFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
