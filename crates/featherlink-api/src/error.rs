use std::time::Duration;

use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

/// Outcome error for every socket call.
///
/// A call resolves to exactly one of these or to a successful
/// [`Response`](crate::Response). Malformed remote data never panics;
/// it lands in [`Unknown`](Self::Unknown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Remote-signalled failures ───────────────────────────────────
    /// The server answered with the `"NO ACK"` sentinel.
    #[error("Not found (server did not acknowledge the call)")]
    NotFound,

    /// The server answered with an error object carrying a recognized status code.
    #[error("Remote error {status} ({}){}", .status.code(), message_suffix(.message.as_deref()))]
    Status {
        status: RemoteStatus,
        message: Option<String>,
    },

    /// The reply shape matched none of the classification rules.
    #[error("Unrecognized reply from server")]
    Unknown,

    // ── Transport ───────────────────────────────────────────────────
    /// No acknowledgement arrived within the configured timeout.
    #[error("Call timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    /// The provider or its transport was released before the call resolved.
    ///
    /// Not a remote failure; retrying is up to the caller.
    #[error("Transport interrupted before the call completed")]
    TransportInterrupted,

    // ── Data ────────────────────────────────────────────────────────
    /// Typed decoding of a successful response failed.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String },
}

fn message_suffix(message: Option<&str>) -> String {
    message.map(|m| format!(": {m}")).unwrap_or_default()
}

impl Error {
    /// Returns `true` for [`NotFound`](Self::NotFound) or a remote 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Status {
                    status: RemoteStatus::NotFound,
                    ..
                }
        )
    }

    /// Returns `true` if repeating the call later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TimedOut { .. } | Self::TransportInterrupted => true,
            Self::Status { status, .. } => matches!(
                status,
                RemoteStatus::Timeout | RemoteStatus::TooManyRequests | RemoteStatus::Unavailable
            ),
            _ => false,
        }
    }

    /// Returns `true` if the remote rejected the caller's credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Status {
                status: RemoteStatus::NotAuthenticated,
                ..
            }
        )
    }

    /// The numeric status code, if the server sent one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(status.code()),
            _ => None,
        }
    }
}

/// Status codes the server uses in error replies.
///
/// Codes outside this table are not treated as errors by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum RemoteStatus {
    BadRequest,
    NotAuthenticated,
    PaymentError,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    Timeout,
    Conflict,
    LengthRequired,
    Unprocessable,
    TooManyRequests,
    GeneralError,
    NotImplemented,
    BadGateway,
    Unavailable,
}

impl RemoteStatus {
    /// Look up a status by its numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        let status = match code {
            400 => Self::BadRequest,
            401 => Self::NotAuthenticated,
            402 => Self::PaymentError,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            406 => Self::NotAcceptable,
            408 => Self::Timeout,
            409 => Self::Conflict,
            411 => Self::LengthRequired,
            422 => Self::Unprocessable,
            429 => Self::TooManyRequests,
            500 => Self::GeneralError,
            501 => Self::NotImplemented,
            502 => Self::BadGateway,
            503 => Self::Unavailable,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotAuthenticated => 401,
            Self::PaymentError => 402,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable => 406,
            Self::Timeout => 408,
            Self::Conflict => 409,
            Self::LengthRequired => 411,
            Self::Unprocessable => 422,
            Self::TooManyRequests => 429,
            Self::GeneralError => 500,
            Self::NotImplemented => 501,
            Self::BadGateway => 502,
            Self::Unavailable => 503,
        }
    }
}
