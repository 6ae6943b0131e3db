//! Configuration for the indexer.
//!
//! Typed settings with validation plus a loader merging `configuration/` files with
//! `APP_`-prefixed environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
