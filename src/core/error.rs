//! Error handling and error types for distgcn.
//!
//! Every error in this crate is fatal for the run: workers are tightly
//! coupled through collective calls, so there is no partial-failure or retry
//! path. Errors are still surfaced as values so that the launcher can report
//! them and exit non-zero instead of hanging a collective.

use std::io;
use thiserror::Error;

use crate::core::types::Rank;

/// Main error type for the distgcn library.
#[derive(Error, Debug)]
pub enum GcnError {
    /// Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A required configuration option was not supplied
    #[error("Missing required option: {option}")]
    MissingOption { option: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Matrix or partition shapes disagree with each other
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Partitioning invariants violated
    #[error("Partition error: {message}")]
    Partition { message: String },

    /// A peer disconnected or sent an unexpected message
    #[error("Communication error on rank {rank}: {message}")]
    Communication { rank: Rank, message: String },

    /// Dataset construction or loading errors
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    /// Numerical computation errors (NaN loss, zero degree, ...)
    #[error("Numerical error: {message}")]
    Numerical { message: String },

    /// File and socket I/O errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Wire encoding errors
    #[error("Bincode error: {source}")]
    Bincode {
        #[from]
        source: bincode::Error,
    },

    /// JSON configuration errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// TOML configuration errors
    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    /// CSV edge-list parsing errors
    #[cfg(feature = "csv")]
    #[error("CSV parsing error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    /// Internal library errors (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results using GcnError
pub type Result<T> = std::result::Result<T, GcnError>;

impl GcnError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GcnError::Config {
            message: message.into(),
        }
    }

    /// Create a missing-option error
    pub fn missing_option<S: Into<String>>(option: S) -> Self {
        GcnError::MissingOption {
            option: option.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        GcnError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch<C, E, A>(context: C, expected: E, actual: A) -> Self
    where
        C: Into<String>,
        E: Into<String>,
        A: Into<String>,
    {
        GcnError::ShapeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a partition error
    pub fn partition<S: Into<String>>(message: S) -> Self {
        GcnError::Partition {
            message: message.into(),
        }
    }

    /// Create a communication error attributed to `rank`
    pub fn communication<S: Into<String>>(rank: Rank, message: S) -> Self {
        GcnError::Communication {
            rank,
            message: message.into(),
        }
    }

    /// Create a dataset error
    pub fn dataset<S: Into<String>>(message: S) -> Self {
        GcnError::Dataset {
            message: message.into(),
        }
    }

    /// Create a numerical error
    pub fn numerical<S: Into<String>>(message: S) -> Self {
        GcnError::Numerical {
            message: message.into(),
        }
    }

    /// Create an internal error (should be used sparingly)
    pub fn internal<S: Into<String>>(message: S) -> Self {
        GcnError::Internal {
            message: message.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GcnError::Config { .. } => "config",
            GcnError::MissingOption { .. } => "missing_option",
            GcnError::InvalidParameter { .. } => "invalid_parameter",
            GcnError::ShapeMismatch { .. } => "shape_mismatch",
            GcnError::Partition { .. } => "partition",
            GcnError::Communication { .. } => "communication",
            GcnError::Dataset { .. } => "dataset",
            GcnError::Numerical { .. } => "numerical",
            GcnError::Io { .. } => "io",
            GcnError::Bincode { .. } => "bincode",
            GcnError::Json { .. } => "json",
            GcnError::Toml { .. } => "toml",
            #[cfg(feature = "csv")]
            GcnError::Csv { .. } => "csv",
            GcnError::Internal { .. } => "internal",
        }
    }
}

/// Return early with a shape mismatch unless both dimensions agree.
#[macro_export]
macro_rules! ensure_shape {
    ($context:expr, $expected:expr, $actual:expr) => {
        if $expected != $actual {
            return Err($crate::core::error::GcnError::shape_mismatch(
                $context,
                format!("{:?}", $expected),
                format!("{:?}", $actual),
            ));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GcnError::config("test configuration error");
        assert_eq!(err.category(), "config");

        let err = GcnError::communication(3, "peer hung up");
        assert_eq!(err.category(), "communication");
        assert!(err.to_string().contains("rank 3"));
    }

    #[test]
    fn test_missing_option_display() {
        let err = GcnError::missing_option("epochs");
        let error_string = format!("{}", err);
        assert!(error_string.contains("Missing required option"));
        assert!(error_string.contains("epochs"));
    }

    #[test]
    fn test_shape_macro() {
        fn check(a: (usize, usize), b: (usize, usize)) -> Result<()> {
            ensure_shape!("test", a, b);
            Ok(())
        }
        assert!(check((2, 3), (2, 3)).is_ok());
        let err = check((2, 3), (3, 2)).unwrap_err();
        assert_eq!(err.category(), "shape_mismatch");
        assert!(err.to_string().contains("(2, 3)"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: GcnError = io_err.into();
        assert!(matches!(err, GcnError::Io { .. }));
        assert_eq!(err.category(), "io");
    }
}
