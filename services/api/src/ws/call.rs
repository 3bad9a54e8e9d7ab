//! Per-call state shared between the read loop, the bridge and the writer.

use callbridge_core::InputCallback;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Observed state of the media-stream socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Open => write!(f, "open"),
            TransportState::Closing => write!(f, "closing"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}

/// One phone call.
pub struct CallSession {
    call_id: Uuid,
    stream_sid: RwLock<Option<String>>,
    input_callback: RwLock<Option<InputCallback>>,
    transport: watch::Sender<TransportState>,
}

impl CallSession {
    pub fn new(call_id: Uuid) -> Arc<Self> {
        let (transport, _) = watch::channel(TransportState::Connecting);
        Arc::new(Self {
            call_id,
            stream_sid: RwLock::new(None),
            input_callback: RwLock::new(None),
            transport,
        })
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().clone()
    }

    /// Records the stream identifier. Only the first call has an effect;
    /// returns whether this call set it.
    pub fn set_stream_sid(&self, stream_sid: &str) -> bool {
        let mut current = self.stream_sid.write();
        if current.is_some() {
            return false;
        }
        *current = Some(stream_sid.to_string());
        true
    }

    pub fn clear_stream_sid(&self) {
        *self.stream_sid.write() = None;
    }

    pub fn input_callback(&self) -> Option<InputCallback> {
        self.input_callback.read().clone()
    }

    pub fn set_input_callback(&self, callback: Option<InputCallback>) {
        *self.input_callback.write() = callback;
    }

    pub fn transport_state(&self) -> TransportState {
        *self.transport.borrow()
    }

    pub fn set_transport_state(&self, state: TransportState) {
        self.transport.send_replace(state);
    }

    /// Moves an open transport to `Closing`. Returns false if it was not open.
    pub fn begin_closing(&self) -> bool {
        self.transport.send_if_modified(|state| {
            if *state == TransportState::Open {
                *state = TransportState::Closing;
                true
            } else {
                false
            }
        })
    }

    pub fn watch_transport(&self) -> watch::Receiver<TransportState> {
        self.transport.subscribe()
    }
}
