//! Ingest failure-policy configuration.

use crate::core::error::BacktestError;
use std::fmt;
use std::str::FromStr;

/// What to do when a row violates an ingest invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any invariant violation aborts the compile.
    HardFail,
    /// Record the violation to a quarantine sink, then apply the
    /// configured [`QuarantineAction`].
    Quarantine,
}

impl FailurePolicy {
    /// The stable string form used on the CLI.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::HardFail => "hard_fail",
            FailurePolicy::Quarantine => "quarantine",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard_fail" => Ok(FailurePolicy::HardFail),
            "quarantine" => Ok(FailurePolicy::Quarantine),
            _ => Err(BacktestError::schema(format!(
                "invalid failure policy: {s:?}"
            ))),
        }
    }
}

/// How the batcher resumes after a quarantined violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineAction {
    /// Record, then still raise the error.
    Halt,
    /// Drop the offending row and continue.
    SkipRow,
    /// Drop every row sharing the offending local timestamp, then resume.
    SkipBatch,
}

impl QuarantineAction {
    /// The stable string form used on the CLI.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineAction::Halt => "halt",
            QuarantineAction::SkipRow => "skip_row",
            QuarantineAction::SkipBatch => "skip_batch",
        }
    }
}

impl fmt::Display for QuarantineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuarantineAction {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(QuarantineAction::Halt),
            "skip_row" => Ok(QuarantineAction::SkipRow),
            "skip_batch" => Ok(QuarantineAction::SkipBatch),
            _ => Err(BacktestError::schema(format!(
                "invalid quarantine action: {s:?}"
            ))),
        }
    }
}
