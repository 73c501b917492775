// ── Runtime provider configuration ──
//
// Describes how a provider talks to its socket. Never touches disk;
// `featherlink-config` builds one of these from a profile.

use std::time::Duration;

use featherlink_api::TimeoutStart;
use url::Url;

/// Configuration for a single socket provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Socket base URL (e.g., `wss://api.example.com`).
    pub url: Url,
    /// Bound on the connection attempt and on every acknowledged emit.
    pub timeout: Duration,
    /// When a call's timeout clock starts.
    pub timeout_start: TimeoutStart,
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Self::DEFAULT_TIMEOUT,
            timeout_start: TimeoutStart::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_start(mut self, timeout_start: TimeoutStart) -> Self {
        self.timeout_start = timeout_start;
        self
    }
}
