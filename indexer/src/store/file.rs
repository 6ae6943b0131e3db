use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::store::base::CheckpointStore;

#[derive(Debug, Default)]
struct Inner {
    /// Entries as last read from or written to disk. `None` until first access.
    entries: Option<BTreeMap<String, String>>,
}

/// Checkpoint store persisting one JSON object per aggregate.
///
/// The file lives at `{directory}/{scope}.json` and is replaced atomically on every
/// write: the new content goes to a temporary sibling, is synced to disk and then
/// renamed over the previous file. A missing or unreadable file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl JsonFileCheckpointStore {
    pub fn new(directory: impl AsRef<Path>, scope: &str) -> Self {
        Self {
            path: directory.as_ref().join(format!("{scope}.json")),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> EtlResult<BTreeMap<String, String>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint file yet, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "checkpoint file is not a valid JSON object, starting empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    /// Directory holding the checkpoint file, `.` for a bare file name.
    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> EtlResult<()> {
        let directory = self.directory();
        fs::create_dir_all(directory).await?;

        let content = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(|err| {
            etl_error!(
                ErrorKind::IoError,
                "Checkpoint file replacement failed",
                self.path.display(),
                source: err
            )
        })?;

        // The rename is only durable once the directory entry is on disk.
        sync_directory(directory).await?;

        Ok(())
    }

    async fn update<F>(&self, apply: F) -> EtlResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut inner = self.inner.lock().await;
        let mut entries = match inner.entries.take() {
            Some(entries) => entries,
            None => self.read_entries().await?,
        };

        // Work on a copy so that a failed write leaves the cached state as on disk.
        let previous = entries.clone();
        apply(&mut entries);

        match self.write_entries(&entries).await {
            Ok(()) => {
                inner.entries = Some(entries);
                Ok(())
            }
            Err(err) => {
                inner.entries = Some(previous);
                Err(err)
            }
        }
    }
}

#[cfg(unix)]
async fn sync_directory(directory: &Path) -> EtlResult<()> {
    let handle = fs::File::open(directory).await?;
    handle.sync_all().await.map_err(|err| {
        etl_error!(
            ErrorKind::IoError,
            "Checkpoint directory sync failed",
            directory.display(),
            source: err
        )
    })
}

#[cfg(not(unix))]
async fn sync_directory(_directory: &Path) -> EtlResult<()> {
    Ok(())
}

impl CheckpointStore for JsonFileCheckpointStore {
    async fn get(&self, key: &str) -> EtlResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        if inner.entries.is_none() {
            inner.entries = Some(self.read_entries().await?);
        }

        Ok(inner
            .entries
            .as_ref()
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: String) -> EtlResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
        .await
    }

    async fn set_many(&self, entries: Vec<(String, String)>) -> EtlResult<()> {
        self.update(|current| current.extend(entries)).await
    }
}
