//! Profile configuration for featherlink providers.
//!
//! TOML profiles, access-token resolution (env + plaintext), and
//! translation to `featherlink_core::ProviderConfig`. Sources merge in
//! order: built-in defaults, the TOML file, then `FEATHERLINK_`-prefixed
//! environment variables (nested keys separated by `__`, e.g.
//! `FEATHERLINK_DEFAULTS__TIMEOUT=10`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use featherlink_core::{
    AppContext, DEFAULT_JWT_STRATEGY, MemoryAuthStorage, ProviderConfig, TimeoutStart,
};

const DEFAULT_PROFILE: &str = "default";
const ENV_PREFIX: &str = "FEATHERLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named socket profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Resolve a profile and build its provider config, falling back to
    /// [`Defaults`] for anything the profile leaves unset.
    pub fn provider_config(&self, name: Option<&str>) -> Result<ProviderConfig, ConfigError> {
        let (_, profile) = resolve_profile(self, name)?;
        let mut config = profile_to_provider_config(profile)?;
        if profile.timeout.is_none() {
            config.timeout = validate_timeout(self.defaults.timeout)?;
        }
        if profile.timeout_start.is_none() {
            config.timeout_start = self.defaults.timeout_start;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Connect and call timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub timeout_start: TimeoutStart,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            timeout_start: TimeoutStart::default(),
        }
    }
}

fn default_timeout() -> u64 {
    ProviderConfig::DEFAULT_TIMEOUT.as_secs()
}

/// A named socket profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Socket base URL (e.g., "wss://api.example.com").
    pub url: String,

    /// Override timeout, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Override when the call timeout starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_start: Option<TimeoutStart>,

    /// JWT strategy name configured on the server.
    #[serde(default = "default_jwt_strategy")]
    pub jwt_strategy: String,

    /// Stored access token (plaintext; prefer `access_token_env`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Environment variable name containing the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,
}

impl Profile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
            timeout_start: None,
            jwt_strategy: default_jwt_strategy(),
            access_token: None,
            access_token_env: None,
        }
    }
}

fn default_jwt_strategy() -> String {
    DEFAULT_JWT_STRATEGY.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "featherlink", "featherlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("featherlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment. A missing file is
/// not an error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path, ENV_PREFIX).extract()?;
    Ok(config)
}

fn figment(path: &Path, env_prefix: &str) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
}

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent dirs.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Pick a profile by name, else the configured default, else `"default"`.
pub fn resolve_profile<'a>(
    config: &'a Config,
    name: Option<&str>,
) -> Result<(&'a str, &'a Profile), ConfigError> {
    let wanted = name
        .or(config.default_profile.as_deref())
        .unwrap_or(DEFAULT_PROFILE);

    config
        .profiles
        .get_key_value(wanted)
        .map(|(name, profile)| (name.as_str(), profile))
        .ok_or_else(|| ConfigError::ProfileNotFound {
            name: wanted.into(),
        })
}

/// Resolve the stored access token: the profile's env var first, then
/// the plaintext value.
pub fn resolve_access_token(profile: &Profile) -> Option<SecretString> {
    if let Some(ref env_name) = profile.access_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    profile
        .access_token
        .as_ref()
        .map(|token| SecretString::from(token.clone()))
}

/// Build an in-memory auth context seeded from the profile.
pub fn profile_to_auth_storage(profile: &Profile) -> MemoryAuthStorage {
    let storage = MemoryAuthStorage::with_strategy(profile.jwt_strategy.clone());
    if let Some(token) = resolve_access_token(profile) {
        storage.set_access_token(Some(token));
    }
    storage
}

/// Build a `ProviderConfig` from a profile alone.
///
/// Unset fields take the built-in defaults; use
/// [`Config::provider_config`] to honor the `[defaults]` table.
pub fn profile_to_provider_config(profile: &Profile) -> Result<ProviderConfig, ConfigError> {
    let url: Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let timeout = validate_timeout(profile.timeout.unwrap_or_else(default_timeout))?;

    Ok(ProviderConfig::new(url)
        .with_timeout(timeout)
        .with_timeout_start(profile.timeout_start.unwrap_or_default()))
}

fn validate_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}
