//! Core infrastructure shared by every distgcn component.
//!
//! - [`types`]: rank/vertex aliases and small configuration enums
//! - [`constants`]: defaults and fixed numerical constants
//! - [`error`]: the crate-wide error type

pub mod constants;
pub mod error;
pub mod types;

pub use constants::*;
pub use error::{GcnError, Result};
pub use types::*;

/// Initialize the logging subsystem.
///
/// Defaults `RUST_LOG` to `info` when unset. Safe to call more than once and
/// from several worker threads; only the first call installs the logger.
pub fn initialize_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    // Try to initialize env_logger, ignore if already initialized
    let _ = env_logger::try_init();
}
