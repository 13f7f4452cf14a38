//! Run configuration.
//!
//! A run is described by a [`RunConfig`], loaded from a TOML or JSON file
//! and/or assembled from command-line flags. Every field has a default so a
//! config file only needs to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::throttle::ThrottleConfig;

/// Everything needed to execute one chunked DML run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Source server host.
    pub host: String,
    /// Source server port.
    pub port: u16,
    /// MySQL user.
    pub user: String,
    /// MySQL password.
    pub password: String,
    /// Database the statement runs against.
    pub database: String,
    /// The UPDATE or DELETE statement to execute in chunks.
    pub execute_query: String,
    /// Rows fetched per boundary chunk. Zero means a single terminal chunk,
    /// one means per-row equality chunks.
    pub chunk_size: u64,
    /// Rows accumulated per transaction before committing.
    pub txn_size: u64,
    /// Baseline sleep per chunk in milliseconds.
    pub sleep_ms: u64,
    /// Replica lag in seconds at which the run pauses. Zero disables pausing.
    pub max_lag_secs: i64,
    /// Scale sleep directly from lag instead of the dampened curve.
    pub no_consider_lag: bool,
    /// Only monitor replicas whose host contains one of these substrings.
    pub include_replicas: Vec<String>,
    /// Never monitor replicas whose host contains one of these substrings.
    pub exclude_replicas: Vec<String>,
    /// Comma-separated column list that must match a unique key exactly.
    pub forced_chunking_column: Option<String>,
    /// Run every session with `sql_log_bin = 0`.
    pub no_log_bin: bool,
    /// Log periodic progress lines.
    pub print_progress: bool,
    /// Enable debug-level logging.
    pub debug: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            execute_query: String::new(),
            chunk_size: 1000,
            txn_size: 1000,
            sleep_ms: 0,
            max_lag_secs: 0,
            no_consider_lag: false,
            include_replicas: Vec::new(),
            exclude_replicas: Vec::new(),
            forced_chunking_column: None,
            no_log_bin: false,
            print_progress: false,
            debug: false,
        }
    }
}

impl RunConfig {
    /// Loads a config from a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            msg: format!("cannot read {}: {}", path.display(), e),
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "json" => serde_json::from_str(&content).map_err(|e| EngineError::Config {
                msg: format!("invalid JSON in {}: {}", path.display(), e),
            }),
            _ => toml::from_str(&content).map_err(|e| EngineError::Config {
                msg: format!("invalid TOML in {}: {}", path.display(), e),
            }),
        }
    }

    /// Validates cross-field constraints before a run starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.execute_query.trim().is_empty() {
            return Err(EngineError::Config {
                msg: "execute_query must be set".to_string(),
            });
        }
        if self.database.trim().is_empty() {
            return Err(EngineError::Config {
                msg: "database must be set".to_string(),
            });
        }
        if self.txn_size == 0 {
            return Err(EngineError::Config {
                msg: "txn_size must be at least 1".to_string(),
            });
        }
        if !self.include_replicas.is_empty() && !self.exclude_replicas.is_empty() {
            return Err(EngineError::Config {
                msg: "include_replicas and exclude_replicas are mutually exclusive".to_string(),
            });
        }
        Ok(())
    }

    /// The forced chunking columns, split and trimmed, if configured.
    pub fn forced_columns(&self) -> Option<Vec<String>> {
        let raw = self.forced_chunking_column.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        Some(
            raw.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    /// The throttle parameters of this run.
    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            sleep_ms: self.sleep_ms,
            max_lag_secs: self.max_lag_secs,
            no_consider_lag: self.no_consider_lag,
        }
    }
}
