use std::future::Future;

use crate::error::EtlResult;
use crate::types::AggregateDocument;

/// A document the index rejected within an otherwise successful bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub id: String,
    pub reason: String,
}

/// Result of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Documents created or replaced.
    pub indexed: usize,
    /// Documents rejected individually. They are not rolled back or retried.
    pub failures: Vec<DocumentFailure>,
}

/// Search index receiving aggregate documents.
///
/// Writes are keyed by document id and fully replace any existing document, so
/// replaying a batch leaves the index in the same state.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Creates or replaces `documents` in `index_name`.
    ///
    /// Fails with [`crate::error::ErrorKind::DestinationIndexMissing`] when the index does
    /// not exist; indexes are never created implicitly. An empty slice performs no write.
    fn upsert(
        &self,
        index_name: &str,
        documents: &[AggregateDocument],
    ) -> impl Future<Output = EtlResult<BulkOutcome>> + Send;
}
