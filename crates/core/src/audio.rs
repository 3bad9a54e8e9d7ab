//! The audio transport an agent session talks through.

use bytes::Bytes;
use std::sync::Arc;

/// Receives decoded caller audio, one chunk per call, in arrival order.
pub type InputCallback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Capability set an agent session expects from its audio transport.
///
/// Every method may be called from a thread other than the one driving the
/// transport, so implementations must not block on I/O. `output` and
/// `interrupt` in particular are invoked from the agent's receive loop and
/// must hand the work off and return immediately.
pub trait AudioInterface: Send + Sync {
    /// Installs the callback that receives caller audio. Calling it again
    /// replaces the previous callback.
    fn start(&self, input_callback: InputCallback);

    /// Detaches the callback and forgets any per-stream state. Idempotent.
    fn stop(&self);

    /// Queues one chunk of agent audio for playback to the caller.
    fn output(&self, audio: Bytes);

    /// Asks the far end to discard audio it has buffered but not yet played.
    fn interrupt(&self);
}
