//! Adapter between the telephony media stream and an agent session.
//!
//! The bridge is the agent's [`AudioInterface`]. Inbound, the read loop hands
//! it raw frames which it decodes and forwards to the agent's input callback.
//! Outbound, the agent calls `output`/`interrupt` from its own task; the bridge
//! stamps the frame with the stream id and posts it to the writer's mailbox,
//! returning without touching the socket.

use super::{
    call::CallSession,
    protocol::{self, CodecError, OutboundFrame, WireEvent},
};
use bytes::Bytes;
use callbridge_core::{AudioInterface, InputCallback};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    StreamStarted,
    /// A repeated `start`; the first stream id is kept.
    DuplicateStart,
    Forwarded { bytes: usize },
    NoCallback,
    Ignored,
}

/// Result of queueing an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    /// No `start` event has been seen yet, so there is nowhere to send it.
    NoStream,
    /// The writer has shut down.
    WriterGone,
}

pub struct TwilioAudioBridge {
    call: Arc<CallSession>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

impl TwilioAudioBridge {
    /// Creates a bridge and the mailbox its writer must drain.
    pub fn new(call: Arc<CallSession>) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (outbound, frames) = mpsc::unbounded_channel();
        (Self { call, outbound }, frames)
    }

    pub fn call(&self) -> &Arc<CallSession> {
        &self.call
    }

    /// Decodes and handles one raw text frame from the provider.
    pub fn handle_frame(&self, raw: &str) -> Result<InboundOutcome, CodecError> {
        let event = protocol::decode(raw)?;
        Ok(self.handle_event(event))
    }

    pub fn handle_event(&self, event: WireEvent) -> InboundOutcome {
        match event {
            WireEvent::Start { stream_sid } => {
                if self.call.set_stream_sid(&stream_sid) {
                    tracing::Span::current().record("stream_sid", stream_sid.as_str());
                    info!(stream_sid = %stream_sid, "Stream started.");
                    InboundOutcome::StreamStarted
                } else {
                    warn!(stream_sid = %stream_sid, "Ignoring repeated start event.");
                    InboundOutcome::DuplicateStart
                }
            }
            WireEvent::Media { audio } => match self.call.input_callback() {
                Some(callback) => {
                    let bytes = audio.len();
                    callback(audio);
                    InboundOutcome::Forwarded { bytes }
                }
                None => {
                    warn!("Received media event but no input callback is set.");
                    InboundOutcome::NoCallback
                }
            },
            WireEvent::Clear => {
                debug!("Ignoring inbound clear event.");
                InboundOutcome::Ignored
            }
            WireEvent::Unknown { event } => {
                debug!(event = %event, "Unhandled event type.");
                InboundOutcome::Ignored
            }
        }
    }

    /// Queues agent audio for the caller.
    pub fn send_audio(&self, audio: Bytes) -> Dispatch {
        let Some(stream_sid) = self.call.stream_sid() else {
            warn!(bytes = audio.len(), "Attempted to send audio but stream_sid is not set.");
            return Dispatch::NoStream;
        };
        self.enqueue(OutboundFrame::Media { stream_sid, audio })
    }

    /// Queues a `clear` so the provider drops audio it has not played yet.
    pub fn send_clear(&self) -> Dispatch {
        let Some(stream_sid) = self.call.stream_sid() else {
            warn!("Attempted to send clear message but stream_sid is not set.");
            return Dispatch::NoStream;
        };
        self.enqueue(OutboundFrame::Clear { stream_sid })
    }

    fn enqueue(&self, frame: OutboundFrame) -> Dispatch {
        let kind = frame.kind();
        match self.outbound.send(frame) {
            Ok(()) => Dispatch::Queued,
            Err(_) => {
                warn!(frame = kind, "Outbound writer has stopped, discarding frame.");
                Dispatch::WriterGone
            }
        }
    }
}

impl AudioInterface for TwilioAudioBridge {
    fn start(&self, input_callback: InputCallback) {
        self.call.set_input_callback(Some(input_callback));
    }

    fn stop(&self) {
        self.call.set_input_callback(None);
        self.call.clear_stream_sid();
    }

    fn output(&self, audio: Bytes) {
        self.send_audio(audio);
    }

    fn interrupt(&self) {
        self.send_clear();
    }
}
