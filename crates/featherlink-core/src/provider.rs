// ── Provider façade ──
//
// Owns the socket transport for its whole lifetime. Service calls and
// event subscriptions reach the transport through weak references, so
// dropping the provider disconnects the socket and interrupts anything
// still waiting on it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use featherlink_api::events;
use featherlink_api::{
    CONNECT_EVENT, CallDispatcher, Endpoint, Error, Response, SocketTransport, Subscription,
    WireCall,
};

use crate::auth::{AUTHENTICATE_EVENT, AppContext, AuthRequest};
use crate::config::ProviderConfig;

const LOGOUT_EVENT: &str = "logout";

/// The main entry point for consumers.
///
/// Wraps one socket transport. [`setup`](Self::setup) starts the
/// connection; [`request`](Self::request), [`authenticate`](Self::authenticate)
/// and [`logout`](Self::logout) issue acknowledged calls; [`on`](Self::on)
/// and [`once`](Self::once) subscribe to server-pushed events.
pub struct Provider<T: SocketTransport> {
    transport: Arc<T>,
    dispatcher: CallDispatcher<T>,
    config: ProviderConfig,
    cancel: CancellationToken,
    setup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SocketTransport> Provider<T> {
    /// Wrap a transport. Does NOT connect -- call [`setup()`](Self::setup).
    pub fn new(transport: T, config: ProviderConfig) -> Self {
        let transport = Arc::new(transport);
        let dispatcher = CallDispatcher::new(Arc::downgrade(&transport), config.timeout)
            .with_timeout_start(config.timeout_start);

        Self {
            transport,
            dispatcher,
            config,
            cancel: CancellationToken::new(),
            setup_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn url(&self) -> &Url {
        &self.config.url
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Socket providers deliver server-pushed events.
    #[allow(clippy::unused_self)]
    pub fn supports_realtime_events(&self) -> bool {
        true
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect the socket and re-authenticate once it is up.
    ///
    /// On the first `"connect"` event, a token stored in `app` is replayed
    /// as an `authenticate` call. The call is emitted from the connect
    /// handler itself, ahead of any request that was waiting for the same
    /// event. A successful reply carrying a fresh `accessToken` replaces
    /// the stored one; a failed call leaves the stored token in place. The
    /// outcome is logged, never returned. A failed connection attempt is
    /// logged as well.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn setup<A: AppContext>(&self, app: &Arc<A>) {
        let (emitted_tx, emitted_rx) = oneshot::channel();
        let context = Arc::downgrade(app);
        let dispatcher = self.dispatcher.clone();
        self.transport.once(
            CONNECT_EVENT,
            Box::new(move |_| {
                let Some(request) = context
                    .upgrade()
                    .and_then(|context| AuthRequest::from_context(&*context))
                else {
                    debug!("no stored access token, skipping re-authentication");
                    return;
                };
                debug!(strategy = request.strategy(), "re-authenticating with stored token");
                let reply: PendingReply = Box::pin(dispatcher.emit_now(request.wire_call()));
                let _ = emitted_tx.send((request, reply));
            }),
        );

        let app = Arc::downgrade(app);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => debug!("provider released before re-authentication"),
                () = store_reauthenticated_token(emitted_rx, app) => {}
            }
        });
        if let Some(previous) = self
            .setup_task
            .lock()
            .expect("setup task lock poisoned")
            .replace(task)
        {
            previous.abort();
        }

        info!(url = %self.config.url, timeout = ?self.config.timeout, "connecting socket");
        self.transport.connect(
            self.config.timeout,
            Box::new(|| warn!("socket failed to connect")),
        );
    }

    // ── Calls ────────────────────────────────────────────────────

    /// Issue a service call.
    ///
    /// The returned future is lazy: nothing is emitted until it is polled.
    pub fn request(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Response, Error>> + Send + 'static {
        self.dispatcher.dispatch(endpoint.wire_call())
    }

    /// Authenticate the socket with raw credentials.
    ///
    /// The socket authenticates on a fixed event, so `path` only labels
    /// the call in logs.
    pub fn authenticate(
        &self,
        path: &str,
        credentials: Map<String, Value>,
    ) -> impl Future<Output = Result<Response, Error>> + Send + 'static {
        debug!(path, "authenticating socket");
        self.dispatcher.dispatch(WireCall::new(
            AUTHENTICATE_EVENT,
            vec![Value::Object(credentials)],
        ))
    }

    /// End the authenticated session. The call carries no arguments.
    pub fn logout(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Response, Error>> + Send + 'static {
        debug!(path, "logging out socket");
        self.dispatcher
            .dispatch(WireCall::new(LOGOUT_EVENT, Vec::new()))
    }

    // ── Realtime events ──────────────────────────────────────────

    /// Every object payload of `event`, until the subscription is dropped.
    pub fn on(&self, event: impl Into<String>) -> Subscription {
        events::on(Arc::downgrade(&self.transport), event)
    }

    /// The next object payload of `event`, then completion.
    pub fn once(&self, event: impl Into<String>) -> Subscription {
        events::once(Arc::downgrade(&self.transport), event)
    }

    /// Unregister every listener for `event`, however it was registered.
    pub fn off(&self, event: &str) {
        debug!(event, "unregistering event listeners");
        self.transport.off(event);
    }
}

impl<T: SocketTransport> Drop for Provider<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.transport.disconnect();
        debug!(url = %self.config.url, "provider released, socket disconnected");
    }
}

// ── Reconnect authentication ─────────────────────────────────────

type PendingReply = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;

async fn store_reauthenticated_token<A: AppContext>(
    emitted: oneshot::Receiver<(AuthRequest, PendingReply)>,
    app: Weak<A>,
) {
    let Ok((request, reply)) = emitted.await else {
        debug!("re-authentication was not attempted");
        return;
    };
    let result = reply.await;

    let Some(context) = app.upgrade() else {
        return;
    };
    match result {
        Ok(response) => match response.str_field("accessToken") {
            Some(fresh) => {
                context.set_access_token(Some(SecretString::from(fresh.to_owned())));
                debug!("access token refreshed");
            }
            None => debug!("re-authenticated, reply carried no access token"),
        },
        Err(e) => {
            warn!(error = %e, "re-authentication failed, keeping stored token");
            context.set_access_token(Some(request.access_token().clone()));
        }
    }
}
