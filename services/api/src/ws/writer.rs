//! The single task that owns the write half of the media-stream socket.
//!
//! Everything destined for the provider goes through an unbounded mailbox and
//! is written here, one frame at a time, so the socket never sees concurrent
//! writers and callers never wait on the network.

use super::{
    call::{CallSession, TransportState},
    protocol::{self, OutboundFrame},
    retry::{Attempt, RetryPolicy},
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, error::ProtocolError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is {0}, not open")]
    NotOpen(TransportState),
    /// The peer already closed the socket.
    #[error("media stream closed by peer: {0}")]
    Closed(String),
    #[error("write failed: {0}")]
    Write(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::NotOpen(_) => "not_open",
            TransportError::Closed(_) => "closed",
            TransportError::Write(_) => "write_failure",
        }
    }

    /// Maps an axum socket error, separating a clean close from a failed write.
    pub fn from_socket(error: axum::Error) -> Self {
        let message = error.to_string();
        match error.into_inner().downcast::<WsError>() {
            Ok(inner) if is_clean_close(&inner) => TransportError::Closed(message),
            _ => TransportError::Write(message),
        }
    }
}

fn is_clean_close(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::SendAfterClosing)
    )
}

/// Write half of a text-framed socket.
pub trait FrameSink: Send + 'static {
    fn send_text(
        &mut self,
        text: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(TransportError::from_socket)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self)
            .await
            .map_err(TransportError::from_socket)
    }
}

/// What happened to one outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent { attempts: u32 },
    Skipped(TransportState),
    Dropped { attempts: u32 },
}

/// A write that re-checks the transport before every attempt.
struct GuardedWrite<'a, S> {
    sink: &'a mut S,
    call: &'a CallSession,
    text: &'a str,
}

impl<S: FrameSink> Attempt for GuardedWrite<'_, S> {
    type Output = ();
    type Error = TransportError;

    async fn attempt(&mut self, attempt: u32) -> Result<(), TransportError> {
        let state = self.call.transport_state();
        if state != TransportState::Open {
            return Err(TransportError::NotOpen(state));
        }
        if attempt > 1 {
            debug!(attempt, "Retrying outbound frame.");
        }
        self.sink.send_text(self.text.to_string()).await
    }

    fn is_retryable(&self, error: &TransportError) -> bool {
        matches!(error, TransportError::Write(_))
    }
}

pub struct OutboundWriter<S> {
    sink: S,
    call: Arc<CallSession>,
    policy: RetryPolicy,
}

impl<S: FrameSink> OutboundWriter<S> {
    pub fn new(sink: S, call: Arc<CallSession>, policy: RetryPolicy) -> Self {
        Self { sink, call, policy }
    }

    /// Writes one frame under the transport guard and retry policy.
    pub async fn deliver(&mut self, frame: &OutboundFrame) -> WriteOutcome {
        let text = match protocol::encode(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(frame = frame.kind(), "Failed to encode outbound frame: {}", e);
                return WriteOutcome::Dropped { attempts: 0 };
            }
        };

        let mut write = GuardedWrite {
            sink: &mut self.sink,
            call: &self.call,
            text: &text,
        };
        match self.policy.run(&mut write).await {
            Ok(((), attempts)) => {
                if attempts > 1 {
                    info!(frame = frame.kind(), attempts, "Retry successful.");
                }
                debug!(
                    frame = frame.kind(),
                    stream_sid = frame.stream_sid(),
                    bytes = frame.byte_count(),
                    "Sent frame to provider."
                );
                WriteOutcome::Sent { attempts }
            }
            Err(failure) => match failure.error {
                TransportError::NotOpen(state) => {
                    warn!(
                        frame = frame.kind(),
                        bytes = frame.byte_count(),
                        state = %state,
                        "Media stream not open, skipping frame."
                    );
                    WriteOutcome::Skipped(state)
                }
                TransportError::Closed(reason) => {
                    // Later frames hit the guard instead of the dead socket.
                    self.call.begin_closing();
                    warn!(
                        frame = frame.kind(),
                        bytes = frame.byte_count(),
                        reason = %reason,
                        "Media stream closed by peer, skipping frame."
                    );
                    WriteOutcome::Skipped(self.call.transport_state())
                }
                err => {
                    error!(
                        error_kind = err.kind(),
                        frame = frame.kind(),
                        bytes = frame.byte_count(),
                        attempts = failure.attempts,
                        retryable = failure.retryable,
                        "Dropping outbound frame: {}",
                        err
                    );
                    WriteOutcome::Dropped {
                        attempts: failure.attempts,
                    }
                }
            },
        }
    }

    /// Drains the mailbox until every sender is gone or the call is closed,
    /// then closes the socket.
    pub async fn run(mut self, mut frames: mpsc::UnboundedReceiver<OutboundFrame>) {
        let mut transport = self.call.watch_transport();
        let mut running = self.call.transport_state() != TransportState::Closed;

        while running {
            tokio::select! {
                biased;
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        self.deliver(&frame).await;
                    }
                    None => running = false,
                },
                changed = transport.changed() => {
                    if changed.is_err() || *transport.borrow() == TransportState::Closed {
                        running = false;
                    }
                }
            }
        }

        if let Err(e) = self.sink.close().await {
            debug!("Media stream close failed: {}", e);
        }
        debug!("Outbound writer stopped.");
    }
}
