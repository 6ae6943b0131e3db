use indexer::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use indexer::destination::elasticsearch::ElasticsearchDestination;
use indexer::driver::SyncDriver;
use indexer::source::postgres::PostgresSource;
use indexer::store::base::CheckpointStore;
use indexer::store::file::JsonFileCheckpointStore;
use indexer::store::memory::MemoryCheckpointStore;
use indexer::store::postgres::PostgresCheckpointStore;
use indexer_config::shared::{CheckpointStoreConfig, IndexerConfig};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::migrations::apply_indexer_migrations;

/// Connects to the source and the search cluster, then syncs until a shutdown signal.
pub async fn start_indexer(config: IndexerConfig) -> anyhow::Result<()> {
    let source = PostgresSource::connect(&config.source).await?;
    let destination = ElasticsearchDestination::new(&config.elasticsearch)?;

    info!(
        url = %config.elasticsearch.url,
        aggregates = config.sync.aggregates.len(),
        "starting indexer"
    );

    // Each store type yields a different driver type, so the driver is built per branch.
    match &config.checkpoints {
        CheckpointStoreConfig::Memory => {
            warn!("checkpoints are kept in memory and will be lost on exit");

            let driver = SyncDriver::from_config(&config.sync, source, destination, |_| {
                MemoryCheckpointStore::new()
            });
            run_driver(driver).await
        }
        CheckpointStoreConfig::File { directory } => {
            let driver = SyncDriver::from_config(&config.sync, source, destination, |aggregate| {
                JsonFileCheckpointStore::new(directory, aggregate.kind.root_table().as_str())
            });
            run_driver(driver).await
        }
        CheckpointStoreConfig::Postgres => {
            let pool = apply_indexer_migrations(&config.source).await?;

            let driver = SyncDriver::from_config(&config.sync, source, destination, |aggregate| {
                PostgresCheckpointStore::new(pool.clone(), aggregate.kind.as_str())
            });
            run_driver(driver).await
        }
    }
}

async fn run_driver<C>(
    driver: SyncDriver<PostgresSource, C, ElasticsearchDestination>,
) -> anyhow::Result<()>
where
    C: CheckpointStore,
{
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = tokio::spawn(listen_for_shutdown(shutdown_tx));

    let result = driver.run(shutdown_rx).await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}

/// Requests shutdown on SIGINT or SIGTERM.
///
/// The current batch is always finished and checkpointed before the driver stops.
async fn listen_for_shutdown(shutdown_tx: ShutdownTx) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            warn!(error = %err, "failed to register sigterm handler, only ctrl+c will stop the indexer");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, shutting down indexer");
        }
        Some(_) = async {
            match sigterm.as_mut() {
                Some(sigterm) => sigterm.recv().await,
                None => std::future::pending().await,
            }
        } => {
            info!("sigterm received, shutting down indexer");
        }
    }

    shutdown_tx.shutdown();
}
