//! Lifecycle of one media-stream connection.
//!
//! A call moves through `Accepting → Bridging → Draining → Closed`. While
//! bridging, this task is the only reader of the socket and feeds frames to
//! the bridge in order. The agent session runs alongside it and reaches the
//! socket only through the bridge's outbound mailbox.

use super::{
    bridge::{InboundOutcome, TwilioAudioBridge},
    call::{CallSession, TransportState},
    protocol::CodecError,
    retry::{Attempt, RetryPolicy},
    writer::{FrameSink, OutboundWriter},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::{AgentConnector, AudioInterface, SessionObservers};
use futures_util::{Stream, StreamExt};
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler that upgrades the provider's request to a media-stream socket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(name = "call", skip_all, fields(call_id, stream_sid))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let call = CallSession::new(Uuid::new_v4());
    tracing::Span::current().record("call_id", tracing::field::display(call.call_id()));
    info!("Media stream connected.");

    let (sink, reader) = socket.split();
    let orchestrator =
        CallOrchestrator::new(state.connector.clone(), state.config.retry_policy());
    let summary = orchestrator.run(call, reader, sink).await;

    info!(
        frames_received = summary.frames_received,
        frames_skipped = summary.frames_skipped,
        conversation_id = summary.conversation_id.as_deref().unwrap_or("-"),
        "Call finished."
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Accepting,
    Bridging,
    Draining,
    Closed,
}

impl Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Accepting => write!(f, "accepting"),
            CallPhase::Bridging => write!(f, "bridging"),
            CallPhase::Draining => write!(f, "draining"),
            CallPhase::Closed => write!(f, "closed"),
        }
    }
}

/// Counters reported once a call has been torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSummary {
    pub agent_started: bool,
    pub frames_received: u64,
    /// Frames that still failed after the retry and were dropped.
    pub frames_skipped: u64,
    pub conversation_id: Option<String>,
}

/// Decode-and-dispatch of one inbound frame, as a retryable unit.
struct DispatchFrame<'a> {
    bridge: &'a TwilioAudioBridge,
    raw: &'a str,
}

impl Attempt for DispatchFrame<'_> {
    type Output = InboundOutcome;
    type Error = CodecError;

    async fn attempt(&mut self, _attempt: u32) -> Result<InboundOutcome, CodecError> {
        self.bridge.handle_frame(self.raw)
    }
}

pub struct CallOrchestrator {
    connector: Arc<dyn AgentConnector>,
    policy: RetryPolicy,
}

impl CallOrchestrator {
    pub fn new(connector: Arc<dyn AgentConnector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// Bridges `reader`/`sink` to a fresh agent session until the socket goes
    /// away, then drains the session. Never fails: every error past the
    /// handshake is logged and the call is wound down.
    pub async fn run<R, E, S>(
        &self,
        call: Arc<CallSession>,
        mut reader: R,
        sink: S,
    ) -> CallSummary
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        S: FrameSink,
    {
        let mut summary = CallSummary::default();
        let mut phase = CallPhase::Accepting;
        debug!(phase = %phase, "Call phase changed.");
        call.set_transport_state(TransportState::Open);

        phase = CallPhase::Bridging;
        debug!(phase = %phase, "Call phase changed.");
        let (bridge, frames) = TwilioAudioBridge::new(call.clone());
        let bridge = Arc::new(bridge);
        let writer = OutboundWriter::new(sink, call.clone(), self.policy);
        let writer_handle = tokio::spawn(writer.run(frames).in_current_span());

        let mut agent = self.connector.connect(bridge.clone(), logging_observers());

        match agent.start_session().await {
            Ok(()) => {
                summary.agent_started = true;
                info!("Agent session started.");
                self.read_loop(&bridge, &mut reader, &mut summary).await;
            }
            Err(e) => error!("Failed to start agent session: {}", e),
        }

        phase = CallPhase::Draining;
        debug!(phase = %phase, "Call phase changed.");
        call.set_transport_state(TransportState::Closing);
        agent.end_session();
        match agent.wait_for_session_end().await {
            Ok(conversation_id) => {
                info!(
                    conversation_id = conversation_id.as_deref().unwrap_or("-"),
                    "Agent session ended."
                );
                summary.conversation_id = conversation_id;
            }
            Err(e) => error!("Error while ending agent session: {}", e),
        }

        bridge.stop();
        drop(agent);
        drop(bridge);
        call.set_transport_state(TransportState::Closed);
        if let Err(e) = writer_handle.await {
            error!("Outbound writer task failed: {}", e);
        }

        phase = CallPhase::Closed;
        debug!(phase = %phase, "Call phase changed.");
        summary
    }

    async fn read_loop<R, E>(
        &self,
        bridge: &TwilioAudioBridge,
        reader: &mut R,
        summary: &mut CallSummary,
    )
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        while let Some(next) = reader.next().await {
            match next {
                Ok(Message::Text(text)) => {
                    summary.frames_received += 1;
                    if !self.dispatch(bridge, text.as_str()).await {
                        summary.frames_skipped += 1;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Media stream closed by provider.");
                    return;
                }
                Ok(_) => debug!("Ignoring non-text media stream frame."),
                Err(e) => {
                    warn!("Media stream read failed: {}", e);
                    return;
                }
            }
        }
        info!("Media stream disconnected.");
    }

    /// Returns `false` when the frame was dropped.
    async fn dispatch(&self, bridge: &TwilioAudioBridge, raw: &str) -> bool {
        let mut op = DispatchFrame { bridge, raw };
        match self.policy.run(&mut op).await {
            Ok((_, attempts)) => {
                if attempts > 1 {
                    info!(attempts, "Retry successful.");
                }
                true
            }
            Err(failure) => {
                error!(
                    raw = failure.error.raw_frame(),
                    attempts = failure.attempts,
                    "Skipping inbound frame: {}",
                    failure.error
                );
                false
            }
        }
    }
}

fn logging_observers() -> SessionObservers {
    SessionObservers {
        agent_response: Some(Arc::new(|text: &str| info!("Agent: {}", text))),
        user_transcript: Some(Arc::new(|text: &str| info!("User: {}", text))),
    }
}
