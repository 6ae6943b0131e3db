//! Logging setup for the indexer service and its tests.

pub mod tracing;
