//! Client configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! [connection]
//! url = "wss://api.example.com/ws/chat/"
//! reconnect_interval_ms = 1000
//! reconnect_decay = 1.5
//! max_reconnect_interval_ms = 30000
//! max_reconnect_attempts = 5
//! connect_timeout_ms = 10000   # 0 disables the timeout
//!
//! [auth]
//! api_base = "https://api.example.com/api"
//! ttl_secs = 300
//! failure_ttl_secs = 30
//! ```

use crate::cache::TokenValidationCache;
use crate::machine::ReconnectOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat socket and reconnect tuning.
    pub connection: ConnectionConfig,
    /// Token validation endpoint and cache lifetimes.
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket URL of the chat endpoint, without the token.
    pub url: String,
    /// Subprotocols offered in `Sec-WebSocket-Protocol`.
    pub protocols: Vec<String>,
    /// Delay before the first reconnect.
    pub reconnect_interval_ms: u64,
    /// Factor applied to the delay for each further attempt.
    pub reconnect_decay: f64,
    /// Upper bound on the reconnect delay.
    pub max_reconnect_interval_ms: u64,
    /// Reconnects tried before giving up for good.
    pub max_reconnect_attempts: u32,
    /// Time allowed for one connection attempt; 0 waits forever.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/chat/".to_string(),
            protocols: Vec::new(),
            reconnect_interval_ms: 1000,
            reconnect_decay: 1.5,
            max_reconnect_interval_ms: 30_000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_options(&self) -> ReconnectOptions {
        ReconnectOptions {
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            reconnect_decay: self.reconnect_decay,
            max_reconnect_interval: Duration::from_millis(self.max_reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: (self.connect_timeout_ms > 0)
                .then(|| Duration::from_millis(self.connect_timeout_ms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the REST API; validation goes to `{api_base}/auth/validate/`.
    pub api_base: String,
    /// How long a backend verdict on a token is trusted.
    pub ttl_secs: u64,
    /// How long a failed validation request is remembered.
    pub failure_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            ttl_secs: 300,
            failure_ttl_secs: 30,
        }
    }
}

impl AuthConfig {
    /// A fresh, empty cache with these TTLs.
    pub fn cache(&self) -> TokenValidationCache {
        TokenValidationCache::new(
            Duration::from_secs(self.ttl_secs),
            Duration::from_secs(self.failure_ttl_secs),
        )
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
