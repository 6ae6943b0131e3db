use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Backoff settings applied around every relational query and index write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Delay before the first retry. Default: 1000ms.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay. Default: 60000ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays. Must be >= 1.0. Default: 2.0.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Total time budget across all attempts of one operation. Default: 300000ms.
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,

    /// Fraction of each delay added as random jitter, in `[0, 1]`. Default: 0.3.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_elapsed_ms() -> u64 {
    300000
}

fn default_jitter_ratio() -> f64 {
    0.3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_elapsed_ms: default_max_elapsed_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "sync.retry.backoff_multiplier".to_string(),
                constraint: "must be greater than or equal to 1.0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ValidationError::InvalidFieldValue {
                field: "sync.retry.jitter_ratio".to_string(),
                constraint: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "sync.retry.initial_delay_ms".to_string(),
                constraint: "must not exceed `max_delay_ms`".to_string(),
            });
        }

        Ok(())
    }
}
