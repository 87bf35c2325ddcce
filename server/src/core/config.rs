use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_API_KEYS, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_QUEUE_SIZE, DEFAULT_RING_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS, DEFAULT_SLOW_CONSUMER_THRESHOLD, MAX_RING_SIZE,
};

// =============================================================================
// Server Config
// =============================================================================

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Broker Config
// =============================================================================

/// Broker tuning knobs, read once at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Admitted credentials for both the WebSocket and REST surfaces
    pub api_keys: HashSet<String>,
    /// Per-subscriber delivery queue capacity
    pub subscriber_queue_size: usize,
    /// Ring buffer capacity when topic creation omits one
    pub default_ring_buffer_size: usize,
    /// Largest ring buffer a topic may request
    pub max_ring_buffer_size: usize,
    /// Consecutive drops before a subscriber is evicted
    pub slow_consumer_threshold: u32,
    /// When false, drops are absorbed silently and no eviction occurs
    pub slow_consumer_disconnect: bool,
    /// Wall-clock budget in seconds for the graceful shutdown drain
    pub shutdown_timeout_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_keys: DEFAULT_API_KEYS.iter().map(|k| k.to_string()).collect(),
            subscriber_queue_size: DEFAULT_QUEUE_SIZE,
            default_ring_buffer_size: DEFAULT_RING_SIZE,
            max_ring_buffer_size: MAX_RING_SIZE,
            slow_consumer_threshold: DEFAULT_SLOW_CONSUMER_THRESHOLD,
            slow_consumer_disconnect: true,
            shutdown_timeout_seconds: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// App Config
// =============================================================================

/// Application configuration assembled from file, environment and CLI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
}

impl AppConfig {
    /// Load configuration: defaults, then the optional JSON config file,
    /// then CLI/env overrides (clap resolves env vars into the CLI values).
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(host) = &cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(keys) = &cli.api_keys {
            config.broker.api_keys = keys.iter().map(|k| k.trim().to_string()).collect();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.broker.api_keys.is_empty() {
            anyhow::bail!("api_keys must not be empty");
        }
        if self.broker.subscriber_queue_size == 0 {
            anyhow::bail!("subscriber_queue_size must be >= 1");
        }
        if self.broker.default_ring_buffer_size == 0
            || self.broker.default_ring_buffer_size > self.broker.max_ring_buffer_size
        {
            anyhow::bail!(
                "default_ring_buffer_size must be in [1, {}]",
                self.broker.max_ring_buffer_size
            );
        }
        Ok(())
    }
}
