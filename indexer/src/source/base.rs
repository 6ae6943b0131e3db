use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EtlResult;
use crate::types::{AggregateKind, ChangeCursor, ChangedBatch, RootRows, Table};

/// Reads change positions from the relational source.
pub trait ChangeExtractor {
    /// Returns the smallest `modified` value of `table`, or [`None`] if the table is empty.
    fn oldest_modified(
        &self,
        table: Table,
    ) -> impl Future<Output = EtlResult<Option<DateTime<Utc>>>> + Send;

    /// Returns up to `limit` ids of rows of `table` changed strictly after `cursor`.
    ///
    /// Rows are ordered by `(modified, id)` and the batch cursor is the position of the
    /// last returned row. An empty batch carries `cursor` unchanged and means the table
    /// has been fully consumed.
    fn next_changed_batch(
        &self,
        table: Table,
        cursor: &ChangeCursor,
        limit: usize,
    ) -> impl Future<Output = EtlResult<ChangedBatch>> + Send;

    /// Maps ids of `changed_table` to the distinct ids of `root` linked to them.
    ///
    /// Ids are returned once each, ordered by the root's `(modified, id)`.
    fn expand_to_root_ids(
        &self,
        root: Table,
        changed_table: Table,
        changed_ids: &[Uuid],
    ) -> impl Future<Output = EtlResult<Vec<Uuid>>> + Send;
}

/// Retrieves the joined rows needed to rebuild aggregate documents.
pub trait RowFetcher {
    /// Returns the flattened rows of the aggregates rooted at `root_ids`.
    ///
    /// Ids without a matching root row contribute no rows.
    fn fetch_root_rows(
        &self,
        kind: AggregateKind,
        root_ids: &[Uuid],
    ) -> impl Future<Output = EtlResult<RootRows>> + Send;
}
