// Socket transport contract
//
// The core never speaks the socket protocol itself. It needs a handle that
// can report connection status, connect/disconnect, emit with an ack, and
// register/unregister event listeners. Framing, heartbeats, reconnection
// and ack correlation belong to the implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::response::RawReply;

/// Event fired by the transport each time the socket finishes connecting.
pub const CONNECT_EVENT: &str = "connect";

/// Connection status as reported by the transport. The core only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Listener invoked for every occurrence of an event.
pub type EventHandler = Arc<dyn Fn(RawReply) + Send + Sync>;

/// Listener invoked for the next occurrence of an event only.
pub type OnceHandler = Box<dyn FnOnce(RawReply) + Send>;

/// Callback run if a connection attempt fails or times out.
pub type ConnectFailure = Box<dyn FnOnce() + Send>;

/// A persistent, possibly reconnecting, bidirectional event socket.
pub trait SocketTransport: Send + Sync + 'static {
    fn status(&self) -> ConnectionStatus;

    /// Start connecting. `on_failure` runs if the attempt does not succeed
    /// within `timeout`; success is signalled through [`CONNECT_EVENT`].
    fn connect(&self, timeout: Duration, on_failure: ConnectFailure);

    fn disconnect(&self);

    /// Emit `event` with `args` and request an acknowledgement.
    ///
    /// The receiver resolves with the ack payload. If the sender is dropped
    /// the transport went away before acknowledging. Timeouts are applied
    /// by the caller.
    fn emit_with_ack(&self, event: &str, args: Vec<serde_json::Value>) -> oneshot::Receiver<RawReply>;

    fn on(&self, event: &str, handler: EventHandler);

    fn once(&self, event: &str, handler: OnceHandler);

    /// Remove every listener registered for `event`.
    fn off(&self, event: &str);
}
