//! Configuration management for the herald dispatcher
//!
//! This module handles loading and validating configuration from environment
//! variables, files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dispatch engine configuration
    pub dispatch: DispatchConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Delivery gateway configuration
    pub gateway: GatewayConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Dispatch-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Base inter-send delay in milliseconds; the actual delay is randomized
    /// uniformly in [base, 2*base]
    pub base_delay_ms: u64,

    /// Outcome log entries buffered before a batch flush
    pub batch_size: usize,

    /// Timeout for each sender call in seconds
    pub sender_timeout_secs: u64,

    /// Maximum targets accepted at campaign creation
    pub max_targets: usize,

    /// Poll interval while waiting for a sweep to acknowledge cancellation
    pub cancel_wait_ms: u64,

    /// Poll attempts before a blocked delete gives up
    pub cancel_wait_attempts: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Delivery gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    pub url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            batch_size: 50,
            sender_timeout_secs: 30,
            max_targets: 10_000,
            cancel_wait_ms: 200,
            cancel_wait_attempts: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let base_delay_ms = std::env::var("HERALD_BASE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(500);

        let batch_size = std::env::var("HERALD_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(50);

        let sender_timeout_secs = std::env::var("HERALD_SENDER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let max_targets = std::env::var("HERALD_MAX_TARGETS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10_000);

        let sqlite_path = std::env::var("HERALD_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/herald.db"))
            .into();

        let gateway_url = std::env::var("HERALD_GATEWAY_URL")
            .unwrap_or_else(|_| String::from("http://localhost:8800"));

        let log_level = std::env::var("HERALD_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("HERALD_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            dispatch: DispatchConfig {
                base_delay_ms,
                batch_size,
                sender_timeout_secs,
                max_targets,
                ..DispatchConfig::default()
            },
            database: DatabaseConfig { sqlite_path },
            gateway: GatewayConfig { url: gateway_url },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.dispatch.sender_timeout_secs == 0 {
            anyhow::bail!("sender_timeout_secs must be greater than 0");
        }

        if self.dispatch.max_targets == 0 {
            anyhow::bail!("max_targets must be greater than 0");
        }

        if self.dispatch.cancel_wait_attempts == 0 {
            anyhow::bail!("cancel_wait_attempts must be greater than 0");
        }

        if self.gateway.url.trim().is_empty() {
            anyhow::bail!("gateway url must not be empty");
        }

        Ok(())
    }

    /// Get sender timeout as Duration
    #[must_use]
    pub fn sender_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.sender_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/herald.db"),
            },
            gateway: GatewayConfig {
                url: String::from("http://localhost:8800"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
