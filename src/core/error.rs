//! Error types for the backtest pipeline.
//!
//! [`BacktestError`] is the single root error kind: every fallible
//! operation in the crate surfaces one of its variants. The batcher may
//! route a subset of errors into a quarantine sink under
//! `FailurePolicy::Quarantine`; every other component (writer, reader,
//! index, book, portfolio, engine) is strict and never silently skips.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur within the backtest pipeline.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BacktestError {
    /// An I/O error occurred while reading or writing a file.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// Malformed input, bad header, unknown enum value, or a broken
    /// structural invariant.
    Schema {
        /// Description of the schema violation.
        message: String,
    },

    /// A monotonicity violation (timestamps, index offsets).
    Ordering {
        /// Description of the ordering violation.
        message: String,
    },

    /// A decimal parse failure or a value that is not an exact multiple
    /// of its increment.
    Quantization {
        /// Description of the quantization failure.
        message: String,
    },

    /// Quarantine-mode error with a recorded payload.
    Quarantine {
        /// Description of the quarantined condition.
        message: String,
    },

    /// Non-determinism detected (an input changed mid-compile).
    Determinism {
        /// Description of the determinism violation.
        message: String,
    },
}

impl BacktestError {
    /// Build a [`BacktestError::Schema`] from any message.
    pub fn schema(message: impl Into<String>) -> Self {
        BacktestError::Schema {
            message: message.into(),
        }
    }

    /// Build a [`BacktestError::Ordering`] from any message.
    pub fn ordering(message: impl Into<String>) -> Self {
        BacktestError::Ordering {
            message: message.into(),
        }
    }

    /// Build a [`BacktestError::Quantization`] from any message.
    pub fn quantization(message: impl Into<String>) -> Self {
        BacktestError::Quantization {
            message: message.into(),
        }
    }

    /// Build a [`BacktestError::Quarantine`] from any message.
    pub fn quarantine(message: impl Into<String>) -> Self {
        BacktestError::Quarantine {
            message: message.into(),
        }
    }

    /// Build a [`BacktestError::Determinism`] from any message.
    pub fn determinism(message: impl Into<String>) -> Self {
        BacktestError::Determinism {
            message: message.into(),
        }
    }

    /// Build a [`BacktestError::Io`] tagged with the file path involved.
    pub fn io_at(err: &std::io::Error, path: impl Into<PathBuf>) -> Self {
        BacktestError::Io {
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// The bare message of this error, without the kind prefix.
    ///
    /// Used where an error message is embedded into another error or a
    /// quarantine record.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            BacktestError::Io { message, .. }
            | BacktestError::Schema { message }
            | BacktestError::Ordering { message }
            | BacktestError::Quantization { message }
            | BacktestError::Quarantine { message }
            | BacktestError::Determinism { message } => message,
        }
    }
}

impl fmt::Display for BacktestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktestError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "I/O error: {message}")
                }
            }
            BacktestError::Schema { message } => {
                write!(f, "schema error: {message}")
            }
            BacktestError::Ordering { message } => {
                write!(f, "ordering error: {message}")
            }
            BacktestError::Quantization { message } => {
                write!(f, "quantization error: {message}")
            }
            BacktestError::Quarantine { message } => {
                write!(f, "quarantine error: {message}")
            }
            BacktestError::Determinism { message } => {
                write!(f, "determinism error: {message}")
            }
        }
    }
}

impl std::error::Error for BacktestError {}

impl From<std::io::Error> for BacktestError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        BacktestError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}
