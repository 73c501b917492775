// featherlink-api: request/response calls and event subscriptions over a persistent socket

pub mod call;
pub mod error;
pub mod events;
pub mod memory;
pub mod reply;
pub mod response;
pub mod service;
pub mod transport;

pub use call::{CallDispatcher, TimeoutStart};
pub use error::{Error, RemoteStatus};
pub use events::{EventPayload, Subscription};
pub use reply::{NO_ACK, classify, parse_pagination};
pub use response::{Pagination, RawReply, Response, ResponseData};
pub use service::{Endpoint, Id, Method, Query, WireCall};
pub use transport::{
    CONNECT_EVENT, ConnectFailure, ConnectionStatus, EventHandler, OnceHandler, SocketTransport,
};
