use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Backend persisting sync cursors between runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CheckpointStoreConfig {
    /// Cursors live in process memory and are lost on exit.
    Memory,
    /// One JSON file per aggregate inside `directory`.
    File { directory: PathBuf },
    /// Rows in the `indexer.checkpoints` table of the source database.
    Postgres,
}

impl Default for CheckpointStoreConfig {
    fn default() -> Self {
        CheckpointStoreConfig::File {
            directory: PathBuf::from("state"),
        }
    }
}

impl CheckpointStoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let CheckpointStoreConfig::File { directory } = self {
            if directory.as_os_str().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: "checkpoints.directory".to_string(),
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
