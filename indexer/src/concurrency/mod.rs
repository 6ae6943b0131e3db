//! Coordination primitives shared by the sync driver and its pipelines.

pub mod shutdown;
