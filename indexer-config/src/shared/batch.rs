use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounds on how many changed rows are pulled per extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of changed-row ids per batch.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
}

impl BatchConfig {
    pub const DEFAULT_MAX_SIZE: usize = 100;

    /// Largest accepted `max_size`.
    pub const MAX_SIZE_LIMIT: usize = 100;

    /// Ensures `max_size` is within `1..=MAX_SIZE_LIMIT`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 || self.max_size > Self::MAX_SIZE_LIMIT {
            return Err(ValidationError::InvalidFieldValue {
                field: "sync.batch.max_size".to_string(),
                constraint: format!("must be between 1 and {}", Self::MAX_SIZE_LIMIT),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}
