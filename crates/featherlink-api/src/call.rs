// Connection-aware call dispatch
//
// A call is emitted once the transport is connected, bounded by a timeout,
// and resolves exactly once: classified ack, `TimedOut`, or
// `TransportInterrupted`. Calls hold only a weak reference to the transport
// and never extend its lifetime across a suspension point.

use std::future::Future;
use std::sync::Weak;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Error;
use crate::reply::classify;
use crate::response::{RawReply, Response};
use crate::service::WireCall;
use crate::transport::{CONNECT_EVENT, ConnectionStatus, SocketTransport};

/// When a call's timeout clock starts running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStart {
    /// The clock starts when the emit is issued. A call dispatched while the
    /// transport is connecting waits for `"connect"` without a bound.
    #[default]
    OnEmit,
    /// The clock starts when the call is dispatched and also bounds the wait
    /// for `"connect"`.
    OnDispatch,
}

/// Emits wire calls over a shared transport and classifies their acks.
pub struct CallDispatcher<T> {
    transport: Weak<T>,
    timeout: Duration,
    timeout_start: TimeoutStart,
}

impl<T> Clone for CallDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Weak::clone(&self.transport),
            timeout: self.timeout,
            timeout_start: self.timeout_start,
        }
    }
}

impl<T: SocketTransport> CallDispatcher<T> {
    pub fn new(transport: Weak<T>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            timeout_start: TimeoutStart::default(),
        }
    }

    pub fn with_timeout_start(mut self, timeout_start: TimeoutStart) -> Self {
        self.timeout_start = timeout_start;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_start(&self) -> TimeoutStart {
        self.timeout_start
    }

    /// Dispatch `call`. Nothing happens until the returned future is polled.
    pub fn dispatch(
        &self,
        call: WireCall,
    ) -> impl Future<Output = Result<Response, Error>> + Send + 'static {
        let dispatcher = self.clone();
        async move { dispatcher.run(call).await }
    }

    async fn run(self, call: WireCall) -> Result<Response, Error> {
        let Some(transport) = self.transport.upgrade() else {
            debug!(path = %call.path, "transport released, call interrupted");
            return Err(Error::TransportInterrupted);
        };
        let dispatched_at = Instant::now();

        let transport = if transport.status() == ConnectionStatus::Connecting {
            debug!(path = %call.path, "transport connecting, deferring emit until connect");
            let connected = wait_for_connect(&*transport);
            drop(transport);

            let signal = match self.timeout_start {
                TimeoutStart::OnEmit => connected.await,
                TimeoutStart::OnDispatch => {
                    match tokio::time::timeout_at(dispatched_at + self.timeout, connected).await {
                        Ok(signal) => signal,
                        Err(_) => {
                            debug!(path = %call.path, "timed out waiting for connect");
                            return Err(self.timed_out());
                        }
                    }
                }
            };
            if signal.is_err() {
                debug!(path = %call.path, "connect listener dropped, call interrupted");
                return Err(Error::TransportInterrupted);
            }
            self.transport
                .upgrade()
                .ok_or(Error::TransportInterrupted)?
        } else {
            transport
        };

        debug!(path = %call.path, args = call.args.len(), "emitting call");
        let ack = transport.emit_with_ack(&call.path, call.args);
        drop(transport);

        let deadline = match self.timeout_start {
            TimeoutStart::OnEmit => Instant::now() + self.timeout,
            TimeoutStart::OnDispatch => dispatched_at + self.timeout,
        };
        self.await_ack(&call.path, ack, deadline).await
    }

    /// Emit `call` right away, whatever the connection status, and return
    /// a future resolving with the classified ack.
    ///
    /// Unlike [`dispatch`](Self::dispatch) the emit happens before this
    /// returns, so calls issued from inside an event handler reach the
    /// transport ahead of anything deferred on the same event. The timeout
    /// clock starts at the emit.
    pub fn emit_now(
        &self,
        call: WireCall,
    ) -> impl Future<Output = Result<Response, Error>> + Send + 'static + use<T> {
        let ack = self.transport.upgrade().map(|transport| {
            debug!(path = %call.path, args = call.args.len(), "emitting call");
            transport.emit_with_ack(&call.path, call.args)
        });
        let deadline = Instant::now() + self.timeout;
        let path = call.path;
        let dispatcher = self.clone();
        async move {
            let Some(ack) = ack else {
                debug!(path = %path, "transport released, call interrupted");
                return Err(Error::TransportInterrupted);
            };
            dispatcher.await_ack(&path, ack, deadline).await
        }
    }

    async fn await_ack(
        &self,
        path: &str,
        ack: oneshot::Receiver<RawReply>,
        deadline: Instant,
    ) -> Result<Response, Error> {
        match tokio::time::timeout_at(deadline, ack).await {
            Ok(Ok(reply)) => {
                trace!(path, len = reply.len(), "ack received");
                classify(&reply)
            }
            Ok(Err(_)) => {
                debug!(path, "ack channel closed, call interrupted");
                Err(Error::TransportInterrupted)
            }
            Err(_) => {
                debug!(path, timeout = ?self.timeout, "call timed out");
                Err(self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> Error {
        Error::TimedOut {
            timeout: self.timeout,
        }
    }
}

/// Register a one-shot `"connect"` listener and return its signal.
fn wait_for_connect<T: SocketTransport>(transport: &T) -> oneshot::Receiver<RawReply> {
    let (tx, rx) = oneshot::channel();
    transport.once(
        CONNECT_EVENT,
        Box::new(move |reply| {
            let _ = tx.send(reply);
        }),
    );
    rx
}
