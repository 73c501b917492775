//! Server-pushed event subscriptions.
//!
//! [`on`] and [`once`] wrap transport listener registration in a lazy
//! [`Subscription`] stream. Declaring a subscription costs nothing; the
//! listener is registered on first poll and unregistered (`off`) when the
//! stream finishes or is dropped, whichever comes first.
//!
//! Only object-shaped payloads are delivered. Anything else is dropped.
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! let mut created = featherlink_api::events::on(Arc::downgrade(&transport), "messages created");
//! while let Some(message) = created.next().await {
//!     println!("{}", message["text"]);
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::response::RawReply;
use crate::transport::SocketTransport;

/// Decoded payload of a server-pushed event.
pub type EventPayload = Map<String, Value>;

/// A stream of event payloads tied to one transport listener.
pub struct Subscription {
    inner: Pin<Box<dyn Stream<Item = EventPayload> + Send>>,
}

impl Subscription {
    fn new(stream: impl Stream<Item = EventPayload> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = EventPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Deliver every object payload of `event` until disposed.
///
/// If the transport is gone when the stream is first polled, the stream
/// ends immediately without yielding.
pub fn on<T: SocketTransport>(transport: Weak<T>, event: impl Into<String>) -> Subscription {
    let event = event.into();
    Subscription::new(async_stream::stream! {
        let Some(client) = transport.upgrade() else {
            debug!(event = %event, "transport released, subscription interrupted");
            return;
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler_event = event.clone();
        client.on(
            &event,
            Arc::new(move |reply: RawReply| match decode_payload(reply) {
                Some(payload) => {
                    let _ = tx.send(payload);
                }
                None => trace!(event = %handler_event, "dropping non-object event payload"),
            }),
        );
        debug!(event = %event, "event listener registered");
        let _guard = ListenerGuard::new(&client, event);
        drop(client);

        while let Some(payload) = rx.recv().await {
            yield payload;
        }
    })
}

/// Deliver at most one object payload of `event`, then complete.
pub fn once<T: SocketTransport>(transport: Weak<T>, event: impl Into<String>) -> Subscription {
    let event = event.into();
    Subscription::new(async_stream::stream! {
        let Some(client) = transport.upgrade() else {
            debug!(event = %event, "transport released, subscription interrupted");
            return;
        };

        let (tx, rx) = oneshot::channel();
        client.once(
            &event,
            Box::new(move |reply: RawReply| {
                let _ = tx.send(reply);
            }),
        );
        debug!(event = %event, "one-shot event listener registered");
        let _guard = ListenerGuard::new(&client, event);
        drop(client);

        if let Ok(reply) = rx.await {
            match decode_payload(reply) {
                Some(payload) => {
                    yield payload;
                }
                None => trace!("dropping non-object event payload"),
            }
        }
    })
}

/// The first element of an event payload, if it is an object.
fn decode_payload(reply: RawReply) -> Option<EventPayload> {
    match reply.into_iter().next()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Unregisters the listener when the owning stream ends or is dropped.
struct ListenerGuard<T: SocketTransport> {
    transport: Weak<T>,
    event: String,
}

impl<T: SocketTransport> ListenerGuard<T> {
    fn new(transport: &Arc<T>, event: String) -> Self {
        Self {
            transport: Arc::downgrade(transport),
            event,
        }
    }
}

impl<T: SocketTransport> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.upgrade() {
            debug!(event = %self.event, "event listener unregistered");
            transport.off(&self.event);
        }
    }
}
