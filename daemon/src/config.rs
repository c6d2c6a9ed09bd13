//! Daemon configuration

use anyhow::{Context, Result};
use meeting_crypto::{SECRET_LEN, TokenPolicy, decode_secret, random_secret};
use meeting_protocol::DEFAULT_MAX_FRAME_SIZE;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener and connection limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing
    #[serde(default)]
    pub security: SecurityConfig,

    /// Snapshot and minutes locations
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Largest accepted request frame, terminator excluded
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Idle read deadline in seconds (0 disables)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1234))
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_read_timeout() -> u64 {
    300
}

fn default_max_connections() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_frame_size: default_max_frame_size(),
            read_timeout_secs: default_read_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Token signing secret (hex, 32 bytes)
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Token TTL in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,

    /// Accept legacy unsigned tokens
    #[serde(default)]
    pub accept_unsigned_tokens: bool,
}

impl SecurityConfig {
    /// Decode the configured secret, or generate one for this process.
    ///
    /// A generated secret invalidates every token on restart.
    pub fn token_secret(&self) -> Result<[u8; SECRET_LEN]> {
        match &self.token_secret {
            Some(hex_secret) => decode_secret(hex_secret).context("security.token_secret"),
            None => {
                warn!("No token_secret configured, tokens will not survive a restart");
                Ok(random_secret())
            }
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            ttl_secs: self.token_ttl,
            accept_unsigned: self.accept_unsigned_tokens,
        }
    }
}

fn default_token_ttl() -> u64 {
    86_400 // 24 hours
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl: default_token_ttl(),
            accept_unsigned_tokens: false,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot of the database; in-memory only when absent
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Directory holding `meeting_<id>.txt` minutes
    #[serde(default = "default_minutes_dir")]
    pub minutes_dir: PathBuf,
}

fn default_minutes_dir() -> PathBuf {
    PathBuf::from("minutes")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            minutes_dir: default_minutes_dir(),
        }
    }
}
