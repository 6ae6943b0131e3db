//! Relational source: change extraction and row fetching.

pub mod base;
pub mod postgres;

pub use base::{ChangeExtractor, RowFetcher};
