#![warn(missing_docs)]

//! chunkflow binary: lag-throttled chunked UPDATE/DELETE for MySQL.

use anyhow::Result;
use chunkflow_engine::cli::Cli;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse()?)
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("chunkflow starting");

    tokio::select! {
        result = chunkflow_engine::run::run(config) => {
            let summary = result?;
            tracing::info!(
                "finished: {} rows affected in {:.2}s",
                summary.rows_affected,
                summary.elapsed_secs
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, stopping");
            Err(chunkflow_engine::error::EngineError::Interrupted.into())
        }
    }
}
