//! Search index writers.

pub mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::{BulkOutcome, Destination, DocumentFailure};
