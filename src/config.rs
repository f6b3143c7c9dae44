//! Configuration management for the gateway.
//!
//! Handles loading configuration from TOML files and environment variables,
//! and defines the per-request store connection parameters.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable holding the token verification key.
pub const JWT_SECRET_ENV: &str = "INGEST_JWT_SECRET";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener and file settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token verification settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Store client settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Worker threads; 0 means one per CPU.
    #[serde(default)]
    pub workers: usize,

    /// Directory export files are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// CORS origins; `*` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            workers: 0,
            export_dir: default_export_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HMAC key used to verify access tokens.
    pub secret: Option<String>,

    /// Clock skew tolerated when checking expiry.
    #[serde(default)]
    pub leeway_secs: u64,
}

/// Store client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "http" or "https".
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Per-operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows per INSERT round-trip.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_insert_batch_size() -> usize {
    10_000
}

fn default_pool_max_idle() -> usize {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            timeout_secs: default_timeout_secs(),
            insert_batch_size: default_insert_batch_size(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

impl StoreConfig {
    /// Returns the per-operation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Store connection parameters supplied with each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    pub database: String,

    pub user: String,
}

fn default_store_port() -> u16 {
    8123
}

impl ConnectionParams {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
        }
    }

    /// Builds the base URL of the store's HTTP interface.
    pub fn base_url(&self, scheme: &str) -> Result<Url> {
        if scheme != "http" && scheme != "https" {
            return Err(GatewayError::config(format!(
                "Invalid scheme '{scheme}'. Expected 'http' or 'https'"
            )));
        }
        if self.host.trim().is_empty() {
            return Err(GatewayError::bad_request("host must not be empty"));
        }

        Url::parse(&format!("{scheme}://{}:{}/", self.host.trim(), self.port))
            .map_err(|e| GatewayError::bad_request(format!("Invalid store address: {e}")))
    }

    /// Returns a display-safe string (no secrets) for logs.
    pub fn display_string(&self) -> String {
        format!(
            "{} @ {}:{} ({})",
            self.database, self.host, self.port, self.user
        )
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ingest-gateway")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            GatewayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment variables as overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.auth.secret = Some(secret);
            }
        }
    }

    /// Checks values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<()> {
        match self.auth.secret.as_deref() {
            None | Some("") => {
                return Err(GatewayError::config(format!(
                    "No token verification key configured. Set [auth] secret or {JWT_SECRET_ENV}"
                )))
            }
            Some(_) => {}
        }
        if self.store.insert_batch_size == 0 {
            return Err(GatewayError::config("store.insert_batch_size must be at least 1"));
        }
        if self.store.timeout_secs == 0 {
            return Err(GatewayError::config("store.timeout_secs must be at least 1"));
        }
        if self.store.scheme != "http" && self.store.scheme != "https" {
            return Err(GatewayError::config(format!(
                "Invalid store.scheme '{}'. Expected 'http' or 'https'",
                self.store.scheme
            )));
        }
        Ok(())
    }
}
