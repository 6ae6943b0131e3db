//! Fakes, fixtures and throwaway databases for exercising pipelines in tests.
//!
//! [`memory_source::MemorySource`] stands in for the content schema,
//! [`crate::destination::memory::MemoryDestination`] for the search index and
//! [`crate::store::memory::MemoryCheckpointStore`] for checkpoint persistence.
//! [`database`] spawns real Postgres databases for the SQL-backed implementations.

pub mod database;
pub mod failing_store;
pub mod fixtures;
pub mod memory_source;
