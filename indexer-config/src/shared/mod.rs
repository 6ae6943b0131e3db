//! Configuration types shared by the indexer library and service.

mod aggregate;
mod base;
mod batch;
mod checkpoint;
mod connection;
mod elasticsearch;
mod indexer;
mod logging;
mod retry;
mod sync;

pub use aggregate::{AggregateConfig, AggregateKind, Table};
pub use base::ValidationError;
pub use batch::BatchConfig;
pub use checkpoint::CheckpointStoreConfig;
pub use connection::{DefaultPgConnectionOptions, IntoConnectOptions, PgConnectionConfig, TlsConfig};
pub use elasticsearch::ElasticsearchConfig;
pub use indexer::IndexerConfig;
pub use logging::LoggingConfig;
pub use retry::RetryConfig;
pub use sync::SyncConfig;
