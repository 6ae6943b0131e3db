use indexer_config::load_config;
use indexer_config::shared::IndexerConfig;

/// Loads and validates the indexer configuration.
pub fn load_indexer_config() -> anyhow::Result<IndexerConfig> {
    let config = load_config::<IndexerConfig>()?;
    config.validate()?;

    Ok(config)
}
