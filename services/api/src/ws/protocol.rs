//! Media-stream wire format spoken by the telephony provider.
//!
//! Every WebSocket text frame carries one JSON event. Inbound we care about
//! `start` (which names the stream) and `media` (base64 caller audio); every
//! other event is passed through as [`WireEvent::Unknown`] so new provider
//! events never break a call. Outbound we emit `media` and `clear`.

use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::STANDARD},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Accepts unpadded input and non-zero trailing bits, which some carriers emit.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Start { stream_sid: String },
    Media { audio: Bytes },
    Clear,
    Unknown { event: String },
}

/// A frame the bridge writes back to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Media { stream_sid: String, audio: Bytes },
    Clear { stream_sid: String },
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Media { .. } => "media",
            OutboundFrame::Clear { .. } => "clear",
        }
    }

    /// Audio bytes carried by the frame (zero for control frames).
    pub fn byte_count(&self) -> usize {
        match self {
            OutboundFrame::Media { audio, .. } => audio.len(),
            OutboundFrame::Clear { .. } => 0,
        }
    }

    pub fn stream_sid(&self) -> &str {
        match self {
            OutboundFrame::Media { stream_sid, .. } | OutboundFrame::Clear { stream_sid } => {
                stream_sid
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is not valid JSON: {source}")]
    InvalidJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{event}` event is missing `{missing_key}`")]
    MalformedEvent {
        raw: String,
        event: String,
        missing_key: &'static str,
    },
    #[error("media payload is not valid base64: {source}")]
    InvalidPayload {
        raw: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("failed to serialize outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CodecError {
    /// The offending inbound frame, verbatim.
    pub fn raw_frame(&self) -> Option<&str> {
        match self {
            CodecError::InvalidJson { raw, .. }
            | CodecError::MalformedEvent { raw, .. }
            | CodecError::InvalidPayload { raw, .. } => Some(raw),
            CodecError::Encode(_) => None,
        }
    }
}

fn missing(raw: &str, event: &str, missing_key: &'static str) -> CodecError {
    CodecError::MalformedEvent {
        raw: raw.to_string(),
        event: event.to_string(),
        missing_key,
    }
}

/// Decodes one inbound text frame.
pub fn decode(raw: &str) -> Result<WireEvent, CodecError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| CodecError::InvalidJson {
        raw: raw.to_string(),
        source,
    })?;
    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| missing(raw, "<none>", "event"))?;

    match event {
        "start" => {
            let stream_sid = value
                .get("start")
                .and_then(|start| start.get("streamSid"))
                .and_then(Value::as_str)
                .ok_or_else(|| missing(raw, event, "start.streamSid"))?;
            Ok(WireEvent::Start {
                stream_sid: stream_sid.to_string(),
            })
        }
        "media" => {
            let payload = value
                .get("media")
                .and_then(|media| media.get("payload"))
                .and_then(Value::as_str)
                .ok_or_else(|| missing(raw, event, "media.payload"))?;
            let audio = LENIENT_BASE64
                .decode(payload)
                .map_err(|source| CodecError::InvalidPayload {
                    raw: raw.to_string(),
                    source,
                })?;
            Ok(WireEvent::Media {
                audio: Bytes::from(audio),
            })
        }
        "clear" => Ok(WireEvent::Clear),
        other => Ok(WireEvent::Unknown {
            event: other.to_string(),
        }),
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum OutboundWire<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: MediaPayload,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

#[derive(Serialize)]
struct MediaPayload {
    payload: String,
}

/// Encodes an outbound frame into its JSON text form.
pub fn encode(frame: &OutboundFrame) -> Result<String, CodecError> {
    let wire = match frame {
        OutboundFrame::Media { stream_sid, audio } => OutboundWire::Media {
            stream_sid,
            media: MediaPayload {
                payload: STANDARD.encode(audio),
            },
        },
        OutboundFrame::Clear { stream_sid } => OutboundWire::Clear { stream_sid },
    };
    Ok(serde_json::to_string(&wire)?)
}
