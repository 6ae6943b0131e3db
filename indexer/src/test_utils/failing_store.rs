use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::store::base::CheckpointStore;

/// Checkpoint store wrapper failing a configurable number of writes.
///
/// Reads always reach the wrapped store. Used to simulate a crash between a successful
/// index write and the checkpoint update.
#[derive(Debug, Clone)]
pub struct FailingCheckpointStore<S> {
    inner: S,
    failures: Arc<Mutex<VecDeque<ErrorKind>>>,
}

impl<S> FailingCheckpointStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes the next `times` writes fail with `kind`.
    pub async fn fail_next_writes(&self, kind: ErrorKind, times: usize) {
        self.failures
            .lock()
            .await
            .extend(std::iter::repeat_n(kind, times));
    }

    async fn injected_failure(&self) -> EtlResult<()> {
        match self.failures.lock().await.pop_front() {
            Some(kind) => Err(etl_error!(kind, "Injected checkpoint write failure")),
            None => Ok(()),
        }
    }
}

impl<S> CheckpointStore for FailingCheckpointStore<S>
where
    S: CheckpointStore + Sync,
{
    async fn get(&self, key: &str) -> EtlResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> EtlResult<()> {
        self.injected_failure().await?;
        self.inner.set(key, value).await
    }

    async fn set_many(&self, entries: Vec<(String, String)>) -> EtlResult<()> {
        self.injected_failure().await?;
        self.inner.set_many(entries).await
    }
}
