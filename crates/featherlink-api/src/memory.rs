//! In-process transport for tests and offline development.
//!
//! [`channel`] returns a [`MemoryTransport`] (hand it to a provider) and the
//! paired [`MemoryServer`] that plays the remote side: it decides when a
//! connection attempt succeeds or fails, receives emitted calls and acks
//! them, and pushes events to registered listeners.
//!
//! ```rust,ignore
//! let (transport, mut server) = featherlink_api::memory::channel();
//! let transport = Arc::new(transport);
//! let dispatcher = CallDispatcher::new(Arc::downgrade(&transport), Duration::from_secs(5));
//!
//! let call = tokio::spawn(dispatcher.dispatch(WireCall::new("find", vec![json!("messages"), json!({})])));
//! let emitted = server.next_call().await.unwrap();
//! emitted.ack(vec![Value::Null, json!([{ "id": 1 }])]);
//! let response = call.await??;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::response::RawReply;
use crate::transport::{
    CONNECT_EVENT, ConnectFailure, ConnectionStatus, EventHandler, OnceHandler, SocketTransport,
};

/// Create a connected transport/server pair. The transport starts `Disconnected`.
pub fn channel() -> (MemoryTransport, MemoryServer) {
    let (calls_tx, calls_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        calls: calls_tx,
    });
    (
        MemoryTransport {
            shared: Arc::clone(&shared),
        },
        MemoryServer {
            shared,
            calls: calls_rx,
        },
    )
}

struct Shared {
    state: Mutex<State>,
    calls: mpsc::UnboundedSender<EmittedCall>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory transport lock poisoned")
    }
}

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    listeners: HashMap<String, Vec<Listener>>,
    pending_connect: Option<ConnectFailure>,
    last_connect_timeout: Option<Duration>,
    connect_attempts: u32,
    disconnects: u32,
}

enum Listener {
    Every(EventHandler),
    Once(OnceHandler),
}

// ── Client side ──────────────────────────────────────────────────────

/// Client half of an in-memory socket.
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("status", &self.shared.lock().status)
            .finish_non_exhaustive()
    }
}

impl SocketTransport for MemoryTransport {
    fn status(&self) -> ConnectionStatus {
        self.shared.lock().status
    }

    fn connect(&self, timeout: Duration, on_failure: ConnectFailure) {
        let mut state = self.shared.lock();
        state.status = ConnectionStatus::Connecting;
        state.pending_connect = Some(on_failure);
        state.last_connect_timeout = Some(timeout);
        state.connect_attempts += 1;
    }

    fn disconnect(&self) {
        let mut state = self.shared.lock();
        state.status = ConnectionStatus::Disconnected;
        state.pending_connect = None;
        state.disconnects += 1;
    }

    fn emit_with_ack(&self, event: &str, args: Vec<Value>) -> oneshot::Receiver<RawReply> {
        let (ack, rx) = oneshot::channel();
        trace!(event, "memory transport emit");
        // A closed server drops the call, which closes the ack channel.
        let _ = self.shared.calls.send(EmittedCall {
            event: event.to_owned(),
            args,
            ack,
        });
        rx
    }

    fn on(&self, event: &str, handler: EventHandler) {
        self.shared
            .lock()
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push(Listener::Every(handler));
    }

    fn once(&self, event: &str, handler: OnceHandler) {
        self.shared
            .lock()
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push(Listener::Once(handler));
    }

    fn off(&self, event: &str) {
        self.shared.lock().listeners.remove(event);
    }
}

// ── Server side ──────────────────────────────────────────────────────

/// A call emitted by the client, waiting for its acknowledgement.
pub struct EmittedCall {
    pub event: String,
    pub args: Vec<Value>,
    ack: oneshot::Sender<RawReply>,
}

impl EmittedCall {
    /// Acknowledge the call. Returns `false` if the caller stopped waiting.
    pub fn ack(self, reply: RawReply) -> bool {
        self.ack.send(reply).is_ok()
    }
}

impl fmt::Debug for EmittedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmittedCall")
            .field("event", &self.event)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Remote half of an in-memory socket.
pub struct MemoryServer {
    shared: Arc<Shared>,
    calls: mpsc::UnboundedReceiver<EmittedCall>,
}

impl MemoryServer {
    pub fn status(&self) -> ConnectionStatus {
        self.shared.lock().status
    }

    /// Force the client-visible status without firing any event.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.shared.lock().status = status;
    }

    /// Finish the pending connection attempt and fire `"connect"`.
    ///
    /// Returns the number of listeners invoked.
    pub fn accept_connection(&self) -> usize {
        {
            let mut state = self.shared.lock();
            state.status = ConnectionStatus::Connected;
            state.pending_connect = None;
        }
        self.push_event(CONNECT_EVENT, Vec::new())
    }

    /// Fail the pending connection attempt, running its failure callback.
    ///
    /// Returns `false` if no attempt was pending.
    pub fn refuse_connection(&self) -> bool {
        let on_failure = {
            let mut state = self.shared.lock();
            state.status = ConnectionStatus::Disconnected;
            state.pending_connect.take()
        };
        match on_failure {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Deliver an event to the client's listeners.
    ///
    /// Every-time listeners stay registered; one-shot listeners are removed
    /// before they run. Returns the number of listeners invoked.
    pub fn push_event(&self, event: &str, payload: RawReply) -> usize {
        let fired = {
            let mut state = self.shared.lock();
            let Some(listeners) = state.listeners.get_mut(event) else {
                return 0;
            };
            let mut kept = Vec::with_capacity(listeners.len());
            let mut fired = Vec::with_capacity(listeners.len());
            for listener in listeners.drain(..) {
                match listener {
                    Listener::Every(handler) => {
                        fired.push(Listener::Every(Arc::clone(&handler)));
                        kept.push(Listener::Every(handler));
                    }
                    once @ Listener::Once(_) => fired.push(once),
                }
            }
            if kept.is_empty() {
                state.listeners.remove(event);
            } else {
                *listeners = kept;
            }
            fired
        };

        let count = fired.len();
        for listener in fired {
            match listener {
                Listener::Every(handler) => handler(payload.clone()),
                Listener::Once(handler) => handler(payload.clone()),
            }
        }
        count
    }

    /// Wait for the next emitted call.
    pub async fn next_call(&mut self) -> Option<EmittedCall> {
        self.calls.recv().await
    }

    /// Take the next emitted call if one is already queued.
    pub fn try_next_call(&mut self) -> Option<EmittedCall> {
        self.calls.try_recv().ok()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.lock().listeners.get(event).map_or(0, Vec::len)
    }

    pub fn connect_attempts(&self) -> u32 {
        self.shared.lock().connect_attempts
    }

    pub fn last_connect_timeout(&self) -> Option<Duration> {
        self.shared.lock().last_connect_timeout
    }

    pub fn disconnects(&self) -> u32 {
        self.shared.lock().disconnects
    }
}

impl fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryServer")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn every_listener_survives_and_once_listener_is_removed() {
        let (transport, server) = channel();
        let hits = Arc::new(AtomicUsize::new(0));

        let every = Arc::clone(&hits);
        transport.on(
            "ping",
            Arc::new(move |_| {
                every.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let once = Arc::clone(&hits);
        transport.once(
            "ping",
            Box::new(move |_| {
                once.fetch_add(10, Ordering::SeqCst);
            }),
        );
        assert_eq!(server.listener_count("ping"), 2);

        assert_eq!(server.push_event("ping", vec![json!({})]), 2);
        assert_eq!(server.listener_count("ping"), 1);
        assert_eq!(server.push_event("ping", vec![json!({})]), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 12);

        transport.off("ping");
        assert_eq!(server.push_event("ping", vec![json!({})]), 0);
    }

    #[test]
    fn connect_lifecycle() {
        let (transport, server) = channel();
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);

        let failed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failed);
        transport.connect(
            Duration::from_secs(3),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(transport.status(), ConnectionStatus::Connecting);
        assert_eq!(server.last_connect_timeout(), Some(Duration::from_secs(3)));

        assert!(server.refuse_connection());
        assert!(!server.refuse_connection());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);

        transport.connect(Duration::from_secs(3), Box::new(|| {}));
        server.accept_connection();
        assert_eq!(transport.status(), ConnectionStatus::Connected);
        assert_eq!(server.connect_attempts(), 2);

        transport.disconnect();
        assert_eq!(server.status(), ConnectionStatus::Disconnected);
        assert_eq!(server.disconnects(), 1);
    }

    #[tokio::test]
    async fn emitted_calls_reach_the_server() {
        let (transport, mut server) = channel();
        let ack = transport.emit_with_ack("get", vec![json!("users"), json!(1)]);

        let call = server.next_call().await.expect("call emitted");
        assert_eq!(call.event, "get");
        assert_eq!(call.args, vec![json!("users"), json!(1)]);
        assert!(call.ack(vec![json!({ "id": 1 })]));

        assert_eq!(ack.await.expect("acked"), vec![json!({ "id": 1 })]);
    }
}
