// Reconnect authentication
//
// The application context owns the stored access token. On first connect
// the provider replays it as a `{strategy, accessToken}` authenticate call
// and writes back whatever token the server hands out.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use featherlink_api::WireCall;

/// Strategy name used when the application does not configure one.
pub const DEFAULT_JWT_STRATEGY: &str = "jwt";

/// Event name of the socket authentication call.
pub(crate) const AUTHENTICATE_EVENT: &str = "authenticate";

/// Token storage and auth settings the provider reads during setup.
///
/// Implementations are shared with a background task, so interior
/// mutability is expected.
pub trait AppContext: Send + Sync + 'static {
    fn access_token(&self) -> Option<SecretString>;

    fn set_access_token(&self, token: Option<SecretString>);

    /// Name of the JWT strategy configured on the server.
    fn jwt_strategy(&self) -> String;
}

// ── AuthRequest ─────────────────────────────────────────────────────

/// Credentials for re-authenticating with a stored token.
#[derive(Clone)]
pub struct AuthRequest {
    strategy: String,
    access_token: SecretString,
}

impl AuthRequest {
    pub fn new(strategy: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            strategy: strategy.into(),
            access_token,
        }
    }

    /// Build the request from whatever the context currently stores.
    ///
    /// `None` when there is no token to replay.
    pub fn from_context(context: &dyn AppContext) -> Option<Self> {
        context
            .access_token()
            .map(|token| Self::new(context.jwt_strategy(), token))
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// The credentials object sent to the server. Exposes the token.
    pub fn to_credentials(&self) -> Map<String, Value> {
        let mut credentials = Map::new();
        credentials.insert("strategy".into(), json!(self.strategy));
        credentials.insert(
            "accessToken".into(),
            json!(self.access_token.expose_secret()),
        );
        credentials
    }

    pub fn wire_call(&self) -> WireCall {
        WireCall::new(AUTHENTICATE_EVENT, vec![Value::Object(self.to_credentials())])
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("strategy", &self.strategy)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

// ── MemoryAuthStorage ───────────────────────────────────────────────

/// Process-local [`AppContext`] holding the token in memory.
pub struct MemoryAuthStorage {
    token: Mutex<Option<SecretString>>,
    jwt_strategy: String,
}

impl MemoryAuthStorage {
    pub fn new() -> Self {
        Self::with_strategy(DEFAULT_JWT_STRATEGY)
    }

    pub fn with_strategy(jwt_strategy: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(None),
            jwt_strategy: jwt_strategy.into(),
        }
    }

    /// Seed the storage with a token, as if restored from a previous session.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.lock() = Some(SecretString::from(token.into()));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Option<SecretString>> {
        self.token.lock().expect("auth storage lock poisoned")
    }
}

impl Default for MemoryAuthStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for MemoryAuthStorage {
    fn access_token(&self) -> Option<SecretString> {
        self.lock().clone()
    }

    fn set_access_token(&self, token: Option<SecretString>) {
        *self.lock() = token;
    }

    fn jwt_strategy(&self) -> String {
        self.jwt_strategy.clone()
    }
}

impl fmt::Debug for MemoryAuthStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuthStorage")
            .field("has_token", &self.lock().is_some())
            .field("jwt_strategy", &self.jwt_strategy)
            .finish()
    }
}
