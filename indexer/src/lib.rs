//! Incremental sync of film, genre and person aggregates from the relational content
//! schema into search indexes.
//!
//! A [`driver::SyncDriver`] runs one [`pipeline::AggregatePipeline`] per aggregate type.
//! Each pipeline extracts changed rows through the [`source`] traits, rebuilds documents
//! with [`transform::consolidate`], writes them through a [`destination::Destination`]
//! and records progress in a [`store::CheckpointStore`].

pub mod concurrency;
pub mod destination;
pub mod driver;
pub mod error;
mod macros;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;

#[cfg(test)]
mod tests;
