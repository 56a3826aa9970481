//! Configuration of a training run.
//!
//! A [`Config`] comes from a `.toml`/`.json` file, from `DISTGCN_*`
//! environment variables, or from [`ConfigBuilder`]. Environment variables
//! override file values.

pub mod core;

pub use self::core::{Config, ConfigBuilder, TransportConfig};
pub use crate::dataset::DatasetConfig;

/// Configuration file picked up by the launcher when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "distgcn.toml";
