//! Quarantine recording.
//!
//! Under `FailurePolicy::Quarantine` the batcher describes each rejected
//! row as a [`QuarantineRecord`] and hands it to a [`QuarantineSink`]
//! before the configured action decides whether ingestion continues. The
//! sink is a capability interface: the engine-side code never depends on
//! a concrete sink.

use crate::core::config::FailurePolicy;
use crate::core::error::BacktestError;
use crate::core::hashing::stable_json;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A description of one quarantined row or batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    /// Human-readable reason, including the originating error.
    pub reason: String,
    /// Source file the offending data came from.
    pub source: String,
    /// 1-based line number, or 0 when no single line applies.
    pub line_number: u64,
    /// Normalized row payload (enums as lowercase names, records as
    /// objects), or null.
    pub payload: Value,
}

/// Receives quarantine records.
pub trait QuarantineSink {
    /// Record one quarantine event.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the sink cannot persist the
    /// record.
    fn record(&mut self, record: &QuarantineRecord) -> Result<(), BacktestError>;
}

/// In-memory sink collecting records, mainly for tests.
#[derive(Debug, Default)]
pub struct VecQuarantineSink {
    /// All records received so far, in order.
    pub records: Vec<QuarantineRecord>,
}

impl VecQuarantineSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuarantineSink for VecQuarantineSink {
    fn record(&mut self, record: &QuarantineRecord) -> Result<(), BacktestError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Sink writing one canonical-JSON line per record.
#[derive(Debug)]
pub struct JsonlQuarantineSink {
    file: BufWriter<File>,
    path: PathBuf,
}

impl JsonlQuarantineSink {
    /// Create (truncating) a quarantine output file.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, BacktestError> {
        let file = File::create(path).map_err(|e| BacktestError::io_at(&e, path))?;
        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Flush and close the sink.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the flush fails.
    pub fn finish(mut self) -> Result<(), BacktestError> {
        self.file
            .flush()
            .map_err(|e| BacktestError::io_at(&e, &self.path))
    }
}

impl QuarantineSink for JsonlQuarantineSink {
    fn record(&mut self, record: &QuarantineRecord) -> Result<(), BacktestError> {
        let payload = json!({
            "reason": record.reason,
            "source": record.source,
            "line_number": record.line_number,
            "payload": record.payload,
        });
        let line = stable_json(&payload)?;
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .map_err(|e| BacktestError::io_at(&e, &self.path))
    }
}

/// Record a quarantine event without suppressing the caller's error.
///
/// Only records under [`FailurePolicy::Quarantine`] with a sink present;
/// hard-fail mode records nothing.
///
/// # Errors
///
/// Propagates sink persistence failures.
pub fn record_quarantine(
    policy: FailurePolicy,
    sink: Option<&mut dyn QuarantineSink>,
    record: &QuarantineRecord,
) -> Result<(), BacktestError> {
    if policy == FailurePolicy::Quarantine {
        if let Some(sink) = sink {
            sink.record(record)?;
        }
    }
    Ok(())
}
