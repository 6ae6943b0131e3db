use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{AggregateConfig, BatchConfig, RetryConfig, ValidationError};

/// Scheduling and batching settings of the sync driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Pause between two sync cycles. Default: 60000ms.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Aggregates processed in order on every cycle.
    #[serde(default = "AggregateConfig::defaults")]
    pub aggregates: Vec<AggregateConfig>,
}

fn default_interval_ms() -> u64 {
    60000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            aggregates: AggregateConfig::defaults(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;
        self.retry.validate()?;

        if self.aggregates.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "sync.aggregates".to_string(),
                constraint: "must list at least one aggregate".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for aggregate in &self.aggregates {
            if !seen.insert(aggregate.kind) {
                return Err(ValidationError::DuplicateAggregate(
                    aggregate.kind.to_string(),
                ));
            }
            aggregate.validate()?;
        }

        Ok(())
    }
}
