//! Server configuration.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokensync_build::{BuilderConfig, Platform};
use tokensync_core::LedgerConfig;

use crate::hub::HubConfig;
use crate::store::StoreSettings;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Directory holding token documents
    pub tokens_dir: PathBuf,

    /// Name of the token document (file `<name>.json`)
    pub document: String,

    /// Root of the build outputs
    pub build_dir: PathBuf,

    /// Platforms recorded in new documents and built by default
    pub platforms: Vec<Platform>,

    /// CORS origins; `*` allows any
    pub allowed_origins: Vec<String>,

    /// Interval between heartbeats on the stream
    pub heartbeat_interval: Duration,

    /// Ledger sizing
    pub ledger: LedgerConfig,

    /// Stream hub sizing
    pub hub: HubConfig,

    /// Build tool program and fixed arguments
    pub build_command: Vec<String>,

    /// Interval recommended to polling clients
    pub polling_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let builder = BuilderConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tokens_dir: PathBuf::from("./tokens"),
            document: "tokens".to_string(),
            build_dir: builder.build_dir,
            platforms: builder.default_platforms,
            allowed_origins: vec!["*".to_string()],
            heartbeat_interval: Duration::from_secs(30),
            ledger: LedgerConfig::default(),
            hub: HubConfig::default(),
            build_command: builder.command,
            polling_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TOKENSYNC_HOST`, `TOKENSYNC_PORT`: listen address
    /// - `TOKENSYNC_TOKENS_DIR`, `TOKENSYNC_DOCUMENT`: token document location
    /// - `TOKENSYNC_BUILD_DIR`: build output root
    /// - `TOKENSYNC_PLATFORMS`: comma-separated default platforms
    /// - `TOKENSYNC_ALLOWED_ORIGINS`: comma-separated CORS origins
    /// - `TOKENSYNC_HEARTBEAT_SECS`: heartbeat interval
    /// - `TOKENSYNC_HISTORY_CAPACITY`, `TOKENSYNC_SYNC_WINDOW`: ledger sizing
    /// - `TOKENSYNC_MAX_CONNECTIONS`, `TOKENSYNC_CONNECTION_BUFFER`: hub sizing
    /// - `TOKENSYNC_BUILD_COMMAND`: build tool invocation
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparseable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("TOKENSYNC_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("TOKENSYNC_PORT") {
            config.port = parse("TOKENSYNC_PORT", &port)?;
        }
        if let Some(dir) = lookup("TOKENSYNC_TOKENS_DIR") {
            config.tokens_dir = PathBuf::from(dir);
        }
        if let Some(document) = lookup("TOKENSYNC_DOCUMENT") {
            config.document = document;
        }
        if let Some(dir) = lookup("TOKENSYNC_BUILD_DIR") {
            config.build_dir = PathBuf::from(dir);
        }
        if let Some(platforms) = lookup("TOKENSYNC_PLATFORMS") {
            config.platforms = split_list(&platforms)
                .map(|name| parse::<Platform>("TOKENSYNC_PLATFORMS", name))
                .collect::<Result<_>>()?;
        }
        if let Some(origins) = lookup("TOKENSYNC_ALLOWED_ORIGINS") {
            config.allowed_origins = split_list(&origins).map(str::to_string).collect();
        }
        if let Some(secs) = lookup("TOKENSYNC_HEARTBEAT_SECS") {
            config.heartbeat_interval =
                Duration::from_secs(parse("TOKENSYNC_HEARTBEAT_SECS", &secs)?);
            anyhow::ensure!(
                !config.heartbeat_interval.is_zero(),
                "TOKENSYNC_HEARTBEAT_SECS must be at least 1"
            );
        }
        if let Some(capacity) = lookup("TOKENSYNC_HISTORY_CAPACITY") {
            config.ledger.history_capacity = parse("TOKENSYNC_HISTORY_CAPACITY", &capacity)?;
        }
        if let Some(window) = lookup("TOKENSYNC_SYNC_WINDOW") {
            config.ledger.sync_window = parse("TOKENSYNC_SYNC_WINDOW", &window)?;
        }
        if let Some(max) = lookup("TOKENSYNC_MAX_CONNECTIONS") {
            config.hub.max_connections = parse("TOKENSYNC_MAX_CONNECTIONS", &max)?;
        }
        if let Some(buffer) = lookup("TOKENSYNC_CONNECTION_BUFFER") {
            config.hub.buffer = parse("TOKENSYNC_CONNECTION_BUFFER", &buffer)?;
        }
        if let Some(command) = lookup("TOKENSYNC_BUILD_COMMAND") {
            config.build_command = command.split_whitespace().map(str::to_string).collect();
            anyhow::ensure!(
                !config.build_command.is_empty(),
                "TOKENSYNC_BUILD_COMMAND must not be empty"
            );
        }

        Ok(config)
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Token store settings derived from this configuration.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            document: self.document.clone(),
            platforms: self.platforms.iter().map(|p| p.as_str().to_string()).collect(),
            ledger: self.ledger,
            ..StoreSettings::default()
        }
    }

    /// Builder configuration derived from this configuration.
    #[must_use]
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            build_dir: self.build_dir.clone(),
            command: self.build_command.clone(),
            default_platforms: self.platforms.clone(),
            ..BuilderConfig::default()
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {key}: '{value}'"))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
