//! Action/fill/equity tape.
//!
//! [`TapeWriter`] traces a replay session as JSON lines: one canonical
//! `{type:"header", ...}` line at open carrying run metadata, then one
//! line per action, fill, and equity sample. Every line is canonical
//! JSON (sorted keys, compact separators, ASCII) terminated by `\n`, so
//! a tape is byte-reproducible for a deterministic run.

use crate::core::error::BacktestError;
use crate::core::hashing::stable_json;
use crate::core::types::{Lots, QuoteAtoms, Side, Ticks, TsNs};
use serde_json::{Map, Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// JSON-lines trace writer for one replay session.
#[derive(Debug)]
pub struct TapeWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl TapeWriter {
    /// Create (truncating) a tape and emit the header line.
    ///
    /// `run_meta` keys are merged into the header object and may not
    /// include `type`.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] if `run_meta` contains a `type`
    /// key, and [`BacktestError::Io`] on file errors.
    pub fn create(path: &Path, run_meta: Option<&Map<String, Value>>) -> Result<Self, BacktestError> {
        let file = File::create(path).map_err(|e| BacktestError::io_at(&e, path))?;
        let mut tape = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
        };
        if let Some(meta) = run_meta {
            if meta.contains_key("type") {
                return Err(BacktestError::schema("run_meta cannot override type"));
            }
            let mut header = meta.clone();
            header.insert("type".to_string(), Value::String("header".to_string()));
            tape.write_line(&Value::Object(header))?;
        }
        Ok(tape)
    }

    /// Record a strategy action.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for non-positive identifiers or
    /// quantity.
    pub fn record_action(
        &mut self,
        ts_recv_ns: TsNs,
        action_id: u64,
        side: Side,
        qty_lots: Lots,
    ) -> Result<(), BacktestError> {
        if action_id == 0 {
            return Err(BacktestError::schema("action_id must be positive"));
        }
        if qty_lots <= 0 {
            return Err(BacktestError::schema("qty_lots must be positive"));
        }
        self.write_line(&json!({
            "type": "action",
            "ts_recv_ns": ts_recv_ns,
            "action_id": action_id,
            "side": side.as_str(),
            "qty_lots": qty_lots,
        }))
    }

    /// Record an executed fill.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for non-positive identifiers,
    /// price, or quantity.
    #[allow(clippy::too_many_arguments)]
    pub fn record_fill(
        &mut self,
        ts_recv_ns: TsNs,
        fill_id: u64,
        action_id: u64,
        side: Side,
        price_ticks: Ticks,
        qty_lots: Lots,
        notional: QuoteAtoms,
        fee_atoms: QuoteAtoms,
    ) -> Result<(), BacktestError> {
        if fill_id == 0 {
            return Err(BacktestError::schema("fill_id must be positive"));
        }
        if action_id == 0 {
            return Err(BacktestError::schema("action_id must be positive"));
        }
        if price_ticks <= 0 {
            return Err(BacktestError::schema("price_ticks must be positive"));
        }
        if qty_lots <= 0 {
            return Err(BacktestError::schema("qty_lots must be positive"));
        }
        self.write_line(&json!({
            "type": "fill",
            "ts_recv_ns": ts_recv_ns,
            "fill_id": fill_id,
            "action_id": action_id,
            "side": side.as_str(),
            "price_ticks": price_ticks,
            "qty_lots": qty_lots,
            "notional": notional,
            "fee_atoms": fee_atoms,
        }))
    }

    /// Record an end-of-batch equity sample.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] on write failure.
    pub fn record_equity(
        &mut self,
        ts_recv_ns: TsNs,
        cash: QuoteAtoms,
        position: Lots,
        equity: QuoteAtoms,
    ) -> Result<(), BacktestError> {
        self.write_line(&json!({
            "type": "equity",
            "ts_recv_ns": ts_recv_ns,
            "cash": cash,
            "position": position,
            "equity": equity,
        }))
    }

    /// Flush and close the tape.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the flush fails.
    pub fn finish(mut self) -> Result<(), BacktestError> {
        self.file
            .flush()
            .map_err(|e| BacktestError::io_at(&e, &self.path))
    }

    fn write_line(&mut self, value: &Value) -> Result<(), BacktestError> {
        let line = stable_json(value)?;
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .map_err(|e| BacktestError::io_at(&e, &self.path))
    }
}
