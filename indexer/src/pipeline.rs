use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::destination::base::Destination;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::retry::RetryPolicy;
use crate::source::base::{ChangeExtractor, RowFetcher};
use crate::store::base::{CheckpointStore, load_cursor, store_cursor};
use crate::transform::consolidate;
use crate::types::{AggregateConfig, AggregateKind, ChangeCursor, ChangedBatch, Table};

/// Outcome of syncing one contributing table of an aggregate.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: Table,
    /// Batches written and checkpointed.
    pub batches: usize,
    /// Documents accepted by the index.
    pub documents: usize,
    /// Documents the index rejected individually.
    pub failed_documents: usize,
    /// Set when the table was stopped by a shutdown request before it was exhausted.
    pub interrupted: bool,
    /// Failure that stopped the table. Its checkpoint stays at the last committed batch.
    pub error: Option<EtlError>,
}

impl TableReport {
    fn new(table: Table) -> Self {
        Self {
            table,
            batches: 0,
            documents: 0,
            failed_documents: 0,
            interrupted: false,
            error: None,
        }
    }
}

/// Outcome of one pass over every contributing table of an aggregate.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub aggregate: AggregateKind,
    pub index_name: String,
    pub tables: Vec<TableReport>,
}

impl AggregateReport {
    pub fn documents(&self) -> usize {
        self.tables.iter().map(|table| table.documents).sum()
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|table| table.error.is_some())
    }
}

/// Keeps one aggregate index in sync with the relational source.
///
/// For each contributing table the pipeline reads changed rows in `(modified, id)`
/// order, maps them to the aggregate roots they affect, rebuilds those documents and
/// writes them to the index. The table's checkpoint moves forward only after the write
/// of a batch succeeded, so a failure at any point re-delivers at most that batch.
#[derive(Debug)]
pub struct AggregatePipeline<S, C, D> {
    config: AggregateConfig,
    batch_size: usize,
    source: S,
    checkpoints: C,
    destination: D,
    retry: RetryPolicy,
}

impl<S, C, D> AggregatePipeline<S, C, D>
where
    S: ChangeExtractor + RowFetcher,
    C: CheckpointStore,
    D: Destination,
{
    pub fn new(
        config: AggregateConfig,
        batch_size: usize,
        source: S,
        checkpoints: C,
        destination: D,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            batch_size,
            source,
            checkpoints,
            destination,
            retry,
        }
    }

    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Syncs every contributing table once, in configuration order.
    ///
    /// A failing table is logged and reported without affecting the other tables.
    /// Remaining tables are skipped once shutdown has been requested.
    pub async fn run_once(&self, shutdown_rx: &ShutdownRx) -> AggregateReport {
        let mut report = AggregateReport {
            aggregate: self.config.kind,
            index_name: self.config.index_name.clone(),
            tables: Vec::with_capacity(self.config.tables.len()),
        };

        for &table in &self.config.tables {
            if is_shutdown_requested(shutdown_rx) {
                info!(
                    aggregate = %self.config.kind,
                    table = %table,
                    "shutdown requested, skipping table"
                );
                break;
            }

            let mut table_report = TableReport::new(table);
            if let Err(err) = self.sync_table(table, shutdown_rx, &mut table_report).await {
                error!(
                    aggregate = %self.config.kind,
                    table = %table,
                    error = %err,
                    "table sync failed, checkpoint not advanced"
                );
                table_report.error = Some(err);
            }

            report.tables.push(table_report);
        }

        report
    }

    async fn sync_table(
        &self,
        table: Table,
        shutdown_rx: &ShutdownRx,
        report: &mut TableReport,
    ) -> EtlResult<()> {
        let Some(mut cursor) = self.initial_cursor(table).await? else {
            debug!(
                aggregate = %self.config.kind,
                table = %table,
                "table is empty, nothing to sync"
            );
            return Ok(());
        };

        loop {
            // The signal is only checked between batches so that a started batch is always
            // written and checkpointed.
            if is_shutdown_requested(shutdown_rx) {
                report.interrupted = true;
                info!(
                    aggregate = %self.config.kind,
                    table = %table,
                    %cursor,
                    "shutdown requested, stopping table sync"
                );
                return Ok(());
            }

            let batch = self
                .retry
                .run("next_changed_batch", || {
                    self.source
                        .next_changed_batch(table, &cursor, self.batch_size)
                })
                .await?;

            if batch.is_empty() {
                debug!(
                    aggregate = %self.config.kind,
                    table = %table,
                    %cursor,
                    "no more changes"
                );
                return Ok(());
            }

            if batch.cursor <= cursor {
                bail!(
                    ErrorKind::InvalidState,
                    "Change cursor did not advance",
                    format!("table {table}: {} after {cursor}", batch.cursor)
                );
            }

            self.process_batch(table, &batch, report).await?;

            self.retry
                .run("store_cursor", || {
                    store_cursor(&self.checkpoints, table, &batch.cursor)
                })
                .await?;

            cursor = batch.cursor;
            report.batches += 1;

            debug!(
                aggregate = %self.config.kind,
                table = %table,
                batch_size = batch.len(),
                %cursor,
                "checkpoint advanced"
            );
        }
    }

    /// Returns the persisted cursor of `table`, or the start of its change history.
    async fn initial_cursor(&self, table: Table) -> EtlResult<Option<ChangeCursor>> {
        let stored = self
            .retry
            .run("load_cursor", || load_cursor(&self.checkpoints, table))
            .await?;

        if let Some(cursor) = stored {
            return Ok(Some(cursor));
        }

        let oldest = self
            .retry
            .run("oldest_modified", || self.source.oldest_modified(table))
            .await?;

        Ok(oldest.map(ChangeCursor::starting_at))
    }

    /// Rebuilds and writes the documents affected by `batch`.
    async fn process_batch(
        &self,
        table: Table,
        batch: &ChangedBatch,
        report: &mut TableReport,
    ) -> EtlResult<()> {
        let root_ids = self.root_ids(table, &batch.ids).await?;
        if root_ids.is_empty() {
            return Ok(());
        }

        let rows = self
            .retry
            .run("fetch_root_rows", || {
                self.source.fetch_root_rows(self.config.kind, &root_ids)
            })
            .await?;

        let documents = consolidate(&rows);
        if documents.is_empty() {
            return Ok(());
        }

        let outcome = self
            .retry
            .run("upsert", || {
                self.destination.upsert(&self.config.index_name, &documents)
            })
            .await?;

        if !outcome.failures.is_empty() {
            warn!(
                aggregate = %self.config.kind,
                table = %table,
                destination = D::name(),
                failed = outcome.failures.len(),
                "some documents were rejected by the index"
            );
        }

        report.documents += outcome.indexed;
        report.failed_documents += outcome.failures.len();

        info!(
            aggregate = %self.config.kind,
            table = %table,
            changed = batch.len(),
            roots = root_ids.len(),
            documents = outcome.indexed,
            index = %self.config.index_name,
            destination = D::name(),
            "batch written"
        );

        Ok(())
    }

    /// Maps changed ids of `table` to the roots of this aggregate.
    async fn root_ids(&self, table: Table, changed_ids: &[Uuid]) -> EtlResult<Vec<Uuid>> {
        let root = self.config.kind.root_table();
        if table == root {
            return Ok(changed_ids.to_vec());
        }

        self.retry
            .run("expand_to_root_ids", || {
                self.source.expand_to_root_ids(root, table, changed_ids)
            })
            .await
    }
}
