//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Default number of entries kept per timeline and per list
pub const DEFAULT_RETENTION_LIMIT: usize = 1000;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub timeline: TimelineConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Bearer token required on admin routes; unset leaves them open
    pub admin_token: Option<String>,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Timeline fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Entries kept per home timeline and per list (default: 1000)
    #[serde(default = "default_retention_limit")]
    pub retention_limit: usize,
    /// Posts scanned per rebuild batch (default: retention_limit * 10)
    pub rebuild_window: Option<usize>,
    /// Stop a rebuild after this many batches even if feeds are not full
    pub max_rebuild_batches: Option<usize>,
    /// Interval of the scheduled retention prune, 0 disables it
    #[serde(default)]
    pub prune_interval_seconds: u64,
    /// Interval of the scheduled full rebuild, 0 disables it
    #[serde(default)]
    pub rebuild_interval_seconds: u64,
}

impl TimelineConfig {
    /// Batch size used when a rebuild is not given an explicit window
    pub fn default_rebuild_window(&self) -> usize {
        self.rebuild_window
            .unwrap_or_else(|| self.retention_limit.saturating_mul(10))
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_RETENTION_LIMIT,
            rebuild_window: None,
            max_rebuild_batches: None,
            prune_interval_seconds: 0,
            rebuild_interval_seconds: 0,
        }
    }
}

fn default_retention_limit() -> usize {
    DEFAULT_RETENTION_LIMIT
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEEDWRIGHT__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/feedwright.db")?
            .set_default("timeline.retention_limit", DEFAULT_RETENTION_LIMIT as i64)?
            .set_default("timeline.prune_interval_seconds", 300)?
            .set_default("timeline.rebuild_interval_seconds", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEEDWRIGHT__*)
            .add_source(
                Environment::with_prefix("FEEDWRIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.timeline.retention_limit == 0 {
            return Err(crate::error::AppError::Config(
                "timeline.retention_limit must be greater than 0".to_string(),
            ));
        }

        if self.timeline.rebuild_window == Some(0) {
            return Err(crate::error::AppError::Config(
                "timeline.rebuild_window must be greater than 0".to_string(),
            ));
        }

        if self.timeline.max_rebuild_batches == Some(0) {
            return Err(crate::error::AppError::Config(
                "timeline.max_rebuild_batches must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self
            .server
            .admin_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            tracing::warn!("server.admin_token is empty; admin routes are unprotected");
        }

        Ok(())
    }
}
