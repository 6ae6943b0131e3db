//! Checkpoint persistence.

pub mod base;
pub mod file;
pub mod memory;
pub mod postgres;

pub use base::{CheckpointStore, load_cursor, store_cursor};
