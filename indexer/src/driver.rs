use std::time::Duration;

use indexer_config::shared::SyncConfig;
use tracing::{error, info};

use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested, wait_for_shutdown};
use crate::destination::base::Destination;
use crate::error::{EtlError, EtlResult};
use crate::pipeline::{AggregatePipeline, AggregateReport};
use crate::retry::RetryPolicy;
use crate::source::base::{ChangeExtractor, RowFetcher};
use crate::store::base::CheckpointStore;
use crate::types::AggregateConfig;

/// Outcome of one pass over every configured aggregate.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub aggregates: Vec<AggregateReport>,
}

impl CycleReport {
    pub fn documents(&self) -> usize {
        self.aggregates.iter().map(AggregateReport::documents).sum()
    }

    pub fn failed_tables(&self) -> usize {
        self.aggregates
            .iter()
            .map(|aggregate| aggregate.failed_tables().count())
            .sum()
    }

    /// Collects the errors of every failed table, or [`None`] if all tables succeeded.
    pub fn errors(&self) -> Option<EtlError> {
        let errors: Vec<EtlError> = self
            .aggregates
            .iter()
            .flat_map(|aggregate| aggregate.failed_tables())
            .filter_map(|table| table.error.clone())
            .collect();

        if errors.is_empty() {
            None
        } else {
            Some(errors.into())
        }
    }
}

/// Runs the aggregate pipelines in sequence, forever or until shutdown.
///
/// Each cycle processes every configured (aggregate, table) pair once. Between cycles
/// the driver sleeps for the configured interval, waking early on shutdown.
#[derive(Debug)]
pub struct SyncDriver<S, C, D> {
    pipelines: Vec<AggregatePipeline<S, C, D>>,
    interval: Duration,
}

impl<S, C, D> SyncDriver<S, C, D>
where
    S: ChangeExtractor + RowFetcher + Clone,
    C: CheckpointStore,
    D: Destination + Clone,
{
    pub fn new(pipelines: Vec<AggregatePipeline<S, C, D>>, interval: Duration) -> Self {
        Self {
            pipelines,
            interval,
        }
    }

    /// Builds one pipeline per configured aggregate.
    ///
    /// The source and destination are shared by every pipeline. `checkpoints` is called
    /// once per aggregate so that each one gets its own checkpoint scope.
    pub fn from_config<F>(config: &SyncConfig, source: S, destination: D, mut checkpoints: F) -> Self
    where
        F: FnMut(&AggregateConfig) -> C,
    {
        let retry = RetryPolicy::from(&config.retry);

        let pipelines = config
            .aggregates
            .iter()
            .map(|aggregate| {
                AggregatePipeline::new(
                    aggregate.clone(),
                    config.batch.max_size,
                    source.clone(),
                    checkpoints(aggregate),
                    destination.clone(),
                    retry.clone(),
                )
            })
            .collect();

        Self::new(pipelines, config.interval())
    }

    pub fn pipelines(&self) -> &[AggregatePipeline<S, C, D>] {
        &self.pipelines
    }

    /// Runs every pipeline once.
    pub async fn run_cycle(&self, shutdown_rx: &ShutdownRx) -> CycleReport {
        let mut report = CycleReport::default();

        for pipeline in &self.pipelines {
            if is_shutdown_requested(shutdown_rx) {
                break;
            }

            report.aggregates.push(pipeline.run_once(shutdown_rx).await);
        }

        report
    }

    /// Repeats sync cycles until shutdown is requested.
    ///
    /// Table failures never stop the loop; they are logged and retried on the next cycle
    /// from their last committed checkpoint.
    pub async fn run(&self, mut shutdown_rx: ShutdownRx) -> EtlResult<()> {
        info!(
            aggregates = self.pipelines.len(),
            destination = D::name(),
            interval_ms = self.interval.as_millis() as u64,
            "starting sync driver"
        );

        loop {
            let report = self.run_cycle(&shutdown_rx).await;

            let failed_tables = report.failed_tables();
            if failed_tables > 0 {
                error!(
                    failed_tables,
                    documents = report.documents(),
                    "sync cycle completed with failures"
                );
            } else {
                info!(documents = report.documents(), "sync cycle completed");
            }

            if is_shutdown_requested(&shutdown_rx) {
                break;
            }

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("sync driver stopped");

        Ok(())
    }
}
