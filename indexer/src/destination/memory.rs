use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::destination::base::{BulkOutcome, Destination, DocumentFailure};
use crate::error::{ErrorKind, EtlResult};
use crate::types::AggregateDocument;
use crate::{bail, etl_error};

#[derive(Debug, Default)]
struct Inner {
    /// Serialized documents per index, keyed by document id.
    indexes: HashMap<String, BTreeMap<Uuid, String>>,
    upsert_calls: usize,
    injected_failures: VecDeque<ErrorKind>,
    /// Rejection reasons for documents the index refuses individually.
    rejected: HashMap<Uuid, String>,
}

/// In-memory search index for tests and local development.
///
/// Indexes must be created explicitly, mirroring a cluster whose mappings are
/// provisioned out of band. Documents are stored in their serialized form so that
/// two writes can be compared byte for byte.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a destination with the given empty indexes.
    pub fn with_indexes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = Inner {
            indexes: names
                .into_iter()
                .map(|name| (name.into(), BTreeMap::new()))
                .collect(),
            ..Inner::default()
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub async fn create_index(&self, name: &str) {
        let mut inner = self.inner.lock().await;
        inner.indexes.entry(name.to_string()).or_default();
    }

    /// Makes the next `times` upserts fail with `kind` before touching any index.
    pub async fn fail_next_upserts(&self, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().await;
        inner.injected_failures.extend(std::iter::repeat_n(kind, times));
    }

    /// Makes every later upsert reject the document with `id`, like a mapping conflict
    /// on a real cluster. The rest of each request is still written.
    pub async fn reject_document(&self, id: Uuid, reason: &str) {
        let mut inner = self.inner.lock().await;
        inner.rejected.insert(id, reason.to_string());
    }

    /// Returns the serialized documents of `index`, ordered by id.
    pub async fn documents(&self, index: &str) -> BTreeMap<Uuid, String> {
        let inner = self.inner.lock().await;
        inner.indexes.get(index).cloned().unwrap_or_default()
    }

    /// Returns one document of `index` parsed as JSON.
    pub async fn document(&self, index: &str, id: Uuid) -> Option<serde_json::Value> {
        let inner = self.inner.lock().await;
        inner
            .indexes
            .get(index)
            .and_then(|documents| documents.get(&id))
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Number of upsert calls received, including failed and empty ones.
    pub async fn upsert_calls(&self) -> usize {
        self.inner.lock().await.upsert_calls
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        index_name: &str,
        documents: &[AggregateDocument],
    ) -> EtlResult<BulkOutcome> {
        let mut inner = self.inner.lock().await;
        inner.upsert_calls += 1;

        if let Some(kind) = inner.injected_failures.pop_front() {
            return Err(etl_error!(kind, "Injected upsert failure", index_name));
        }

        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let Inner {
            indexes, rejected, ..
        } = &mut *inner;

        let Some(index) = indexes.get_mut(index_name) else {
            bail!(
                ErrorKind::DestinationIndexMissing,
                "Index does not exist",
                index_name
            );
        };

        let mut outcome = BulkOutcome::default();
        for document in documents {
            let id = document.id();
            if let Some(reason) = rejected.get(&id) {
                warn!(index = index_name, %id, reason, "document rejected in memory");
                outcome.failures.push(DocumentFailure {
                    id: id.to_string(),
                    reason: reason.clone(),
                });
                continue;
            }

            index.insert(id, serde_json::to_string(document)?);
            outcome.indexed += 1;
        }

        info!(index = index_name, count = outcome.indexed, "documents upserted in memory");

        Ok(outcome)
    }
}
