//! Indexer service binary.
//!
//! Loads configuration, installs logging and runs the sync driver until SIGINT or
//! SIGTERM is received.

use indexer_config::Environment;
use indexer_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_indexer_config;
use crate::core::start_indexer;

mod config;
mod core;
mod migrations;

fn main() -> anyhow::Result<()> {
    let config = load_indexer_config()?;
    let environment = Environment::load()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), &config.logging, environment)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if let Err(err) = start_indexer(config).await {
                error!(error = %err, "indexer stopped with an error");
                return Err(err);
            }

            Ok(())
        })
}
