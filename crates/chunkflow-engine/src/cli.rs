//! Command-line interface.
//!
//! Flags override the config file, which overrides built-in defaults. The
//! password can come from the environment so it stays out of shell history.

use std::path::PathBuf;

use clap::Parser;

use crate::config::RunConfig;
use crate::error::EngineError;

/// Lag-throttled chunked UPDATE/DELETE for MySQL.
#[derive(Parser, Debug)]
#[command(name = "chunkflow", version, about)]
pub struct Cli {
    /// Config file (TOML or JSON by extension)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The UPDATE or DELETE statement to execute in chunks
    #[arg(short, long, value_name = "SQL")]
    pub execute: Option<String>,

    /// Database the statement runs against
    #[arg(short, long)]
    pub database: Option<String>,

    /// Source server host
    #[arg(long)]
    pub host: Option<String>,

    /// Source server port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// MySQL user
    #[arg(short, long)]
    pub user: Option<String>,

    /// MySQL password
    #[arg(short, long, env = "CHUNKFLOW_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Rows fetched per boundary chunk
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Rows accumulated per transaction
    #[arg(long)]
    pub txn_size: Option<u64>,

    /// Baseline sleep per chunk in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// Replica lag in seconds at which the run pauses
    #[arg(long)]
    pub max_lag_secs: Option<i64>,

    /// Scale sleep directly from lag instead of the dampened curve
    #[arg(long)]
    pub no_consider_lag: bool,

    /// Comma-separated host substrings of replicas to monitor
    #[arg(long, value_name = "SUBSTRINGS")]
    pub include_replicas: Option<String>,

    /// Comma-separated host substrings of replicas to ignore
    #[arg(long, value_name = "SUBSTRINGS")]
    pub exclude_replicas: Option<String>,

    /// Comma-separated column list that must match a unique key exactly
    #[arg(long, value_name = "COLUMNS")]
    pub forced_chunking_column: Option<String>,

    /// Run every session with sql_log_bin = 0
    #[arg(long)]
    pub no_log_bin: bool,

    /// Log periodic progress lines
    #[arg(long)]
    pub print_progress: bool,

    /// Enable debug-level logging
    #[arg(long)]
    pub debug: bool,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Cli {
    /// Resolves the effective run configuration.
    pub fn into_config(self) -> Result<RunConfig, EngineError> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(execute) = self.execute {
            cfg.execute_query = execute;
        }
        if let Some(database) = self.database {
            cfg.database = database;
        }
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(user) = self.user {
            cfg.user = user;
        }
        if let Some(password) = self.password {
            cfg.password = password;
        }
        if let Some(chunk_size) = self.chunk_size {
            cfg.chunk_size = chunk_size;
        }
        if let Some(txn_size) = self.txn_size {
            cfg.txn_size = txn_size;
        }
        if let Some(sleep_ms) = self.sleep_ms {
            cfg.sleep_ms = sleep_ms;
        }
        if let Some(max_lag_secs) = self.max_lag_secs {
            cfg.max_lag_secs = max_lag_secs;
        }
        if self.no_consider_lag {
            cfg.no_consider_lag = true;
        }
        if let Some(include) = self.include_replicas.as_deref() {
            cfg.include_replicas = split_list(include);
        }
        if let Some(exclude) = self.exclude_replicas.as_deref() {
            cfg.exclude_replicas = split_list(exclude);
        }
        if let Some(forced) = self.forced_chunking_column {
            cfg.forced_chunking_column = Some(forced);
        }
        if self.no_log_bin {
            cfg.no_log_bin = true;
        }
        if self.print_progress {
            cfg.print_progress = true;
        }
        if self.debug {
            cfg.debug = true;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_alone_build_config() {
        let cli = Cli::parse_from([
            "chunkflow",
            "-e",
            "delete from t where a < 5",
            "-d",
            "app",
            "--chunk-size",
            "500",
        ]);
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.execute_query, "delete from t where a < 5");
        assert_eq!(cfg.database, "app");
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.txn_size, 1000);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "database = \"app\"").unwrap();
        writeln!(file, "execute_query = \"delete from t\"").unwrap();
        writeln!(file, "sleep_ms = 100").unwrap();

        let cli = Cli::parse_from([
            "chunkflow",
            "-c",
            file.path().to_str().unwrap(),
            "--sleep-ms",
            "2500",
        ]);
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.sleep_ms, 2500);
        assert_eq!(cfg.database, "app");
    }

    #[test]
    fn test_replica_lists_split_on_commas() {
        let cli = Cli::parse_from([
            "chunkflow",
            "-e",
            "delete from t",
            "-d",
            "app",
            "--include-replicas",
            "analytics, reporting",
        ]);
        let cfg = cli.into_config().unwrap();
        assert_eq!(
            cfg.include_replicas,
            vec!["analytics".to_string(), "reporting".to_string()]
        );
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let cli = Cli::parse_from(["chunkflow", "-e", "delete from t"]);
        assert!(cli.into_config().is_err());
    }
}
