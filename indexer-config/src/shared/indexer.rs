use serde::Deserialize;

use crate::load::Config;
use crate::shared::{
    CheckpointStoreConfig, ElasticsearchConfig, LoggingConfig, PgConnectionConfig, SyncConfig,
    ValidationError,
};

/// Complete configuration of the indexer service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexerConfig {
    pub source: PgConnectionConfig,
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub checkpoints: CheckpointStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl IndexerConfig {
    /// Validates every section, returning the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.elasticsearch.validate()?;
        self.sync.validate()?;
        self.checkpoints.validate()?;

        Ok(())
    }
}

impl Config for IndexerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_valid() {
        let config: IndexerConfig = serde_json::from_str(
            r#"{
                "source": {"host": "localhost", "port": 5432, "name": "movies_database", "username": "app"},
                "elasticsearch": {"url": "http://localhost:9200"}
            }"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.sync.interval_ms, 60000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let config: IndexerConfig = serde_json::from_str(
            r#"{
                "source": {"host": "localhost", "port": 5432, "name": "movies_database", "username": "app"},
                "elasticsearch": {"url": "http://localhost:9200"},
                "sync": {"batch": {"max_size": 0}}
            }"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }
}
