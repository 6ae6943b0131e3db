use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::store::base::CheckpointStore;

/// Checkpoint store kept in process memory.
///
/// Clones share the same entries. Nothing survives a restart, so every run starts
/// from the oldest row of each table.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored entry.
    pub async fn entries(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> EtlResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> EtlResult<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, String)>) -> EtlResult<()> {
        self.entries.lock().await.extend(entries);
        Ok(())
    }
}
