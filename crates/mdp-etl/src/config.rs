//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

// ============================================================================
// ETL Configuration Constants
// ============================================================================

/// Default SQLite source database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://db.sqlite";

/// Default base URL of the target document index.
pub const DEFAULT_INDEX_URL: &str = "http://127.0.0.1:9200";

/// Default index name documents are loaded into.
pub const DEFAULT_INDEX_NAME: &str = "movies";

/// Default path of the JSON checkpoint file.
pub const DEFAULT_STATE_PATH: &str = "state.json";

/// Default number of records per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of transport-level retries for transient index failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff between transport retries in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default timeout for requests to the index in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for source database queries in seconds.
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;

/// Default page size for the changed-id scan.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 500;

/// Default set of trigger streams.
pub const DEFAULT_STREAMS: &str = "filmwork,genre,person";

/// ETL pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// SQLite source database URL
    pub database_url: String,
    /// Base URL of the target document index
    pub index_url: String,
    /// Name of the target index
    pub index_name: String,
    /// Path of the JSON checkpoint file
    pub state_path: PathBuf,
    /// Records per bulk request (must be >= 1)
    pub batch_size: usize,
    /// Transport-level retries for transient index failures
    pub max_retries: u32,
    /// Backoff between transport retries in milliseconds
    pub retry_backoff_ms: u64,
    /// Timeout for requests to the index in seconds
    pub request_timeout_secs: u64,
    /// Timeout for source database queries in seconds
    pub source_timeout_secs: u64,
    /// Page size for the changed-id scan
    pub scan_page_size: usize,
    /// Trigger streams the pipeline serves
    pub streams: Vec<String>,
}

impl EtlConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = EtlConfig {
            database_url: std::env::var("MDP_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            index_url: std::env::var("MDP_INDEX_URL")
                .unwrap_or_else(|_| DEFAULT_INDEX_URL.to_string()),
            index_name: std::env::var("MDP_INDEX_NAME")
                .unwrap_or_else(|_| DEFAULT_INDEX_NAME.to_string()),
            state_path: std::env::var("MDP_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_PATH)),
            batch_size: std::env::var("MDP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_retries: std::env::var("MDP_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff_ms: std::env::var("MDP_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            request_timeout_secs: std::env::var("MDP_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            source_timeout_secs: std::env::var("MDP_SOURCE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS),
            scan_page_size: std::env::var("MDP_SCAN_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SCAN_PAGE_SIZE),
            streams: std::env::var("MDP_STREAMS")
                .unwrap_or_else(|_| DEFAULT_STREAMS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Invalid settings are construction-time failures, never run-time ones.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::InvalidConfiguration(
                "batch_size must be >= 1".to_string(),
            ));
        }
        if self.scan_page_size == 0 {
            return Err(EtlError::InvalidConfiguration(
                "scan_page_size must be >= 1".to_string(),
            ));
        }
        if self.database_url.is_empty() {
            return Err(EtlError::InvalidConfiguration(
                "database_url must not be empty".to_string(),
            ));
        }
        if self.index_url.is_empty() || self.index_name.is_empty() {
            return Err(EtlError::InvalidConfiguration(
                "index_url and index_name must not be empty".to_string(),
            ));
        }
        if self.streams.is_empty() {
            return Err(EtlError::InvalidConfiguration(
                "at least one stream must be configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Timeout applied to requests to the index
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout applied to source database queries
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    /// Backoff between transport retries
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            streams: DEFAULT_STREAMS.split(',').map(str::to_string).collect(),
        }
    }
}
