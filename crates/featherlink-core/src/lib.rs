// featherlink-core: provider façade over a socket transport, with reconnect authentication.

pub mod auth;
pub mod config;
pub mod provider;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{AppContext, AuthRequest, DEFAULT_JWT_STRATEGY, MemoryAuthStorage};
pub use config::ProviderConfig;
pub use provider::Provider;

// Call and event types callers need alongside the provider.
pub use featherlink_api::{
    ConnectionStatus, Endpoint, Error, EventPayload, Id, Method, Pagination, Query, RemoteStatus,
    Response, ResponseData, SocketTransport, Subscription, TimeoutStart,
};
