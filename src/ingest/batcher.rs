//! Groups vendor L2 rows into batches keyed by local timestamp.
//!
//! [`L2Batcher`] is a pull iterator: it consumes a row stream and yields
//! one [`L2Batch`] per maximal run of rows sharing a local timestamp,
//! enforcing the ingest invariants in order per row:
//!
//! 1. `(exchange, symbol)` is fixed across the stream.
//! 2. `local_timestamp` is non-decreasing.
//! 3. A batch is the maximal run of rows with one `local_timestamp`.
//! 4. Within a batch, `is_snapshot` is constant.
//! 5. `resets_book` iff a snapshot batch follows non-snapshot data.
//! 6. Nanosecond timestamps derive from the microsecond fields; the
//!    exchange timestamp comes from the last contributing row.
//! 7. Updates keep source order; duplicates are preserved.
//!
//! Violations are routed through the configured
//! ([`FailurePolicy`], [`QuarantineAction`]) pair: hard-fail and halt
//! surface the error, skip-row drops the row, skip-batch drops the whole
//! run sharing the offending local timestamp.

use crate::core::config::{FailurePolicy, QuarantineAction};
use crate::core::error::BacktestError;
use crate::core::quantizer::Quantizer;
use crate::core::types::TsNs;
use crate::evlog::types::{L2Batch, L2Update};
use crate::ingest::csv::L2Row;
use crate::ingest::quarantine::{QuarantineRecord, QuarantineSink, record_quarantine};
use serde_json::Value;
use tracing::warn;

/// Reborrow the sink out of the `Option` without tying the result to the
/// lifetime of the outer `&mut Option` borrow.
fn reborrow_sink<'a>(
    sink: &'a mut Option<&mut dyn QuarantineSink>,
) -> Option<&'a mut dyn QuarantineSink> {
    match sink {
        Some(sink) => Some(&mut **sink),
        None => None,
    }
}

/// How to resume after a quarantined (non-halting) violation.
enum Resume {
    Row,
    Batch,
}

/// Pull iterator assembling [`L2Batch`] values from a row stream.
pub struct L2Batcher<'a, I> {
    rows: I,
    quantizer: Quantizer,
    failure_policy: FailurePolicy,
    quarantine_action: QuarantineAction,
    sink: Option<&'a mut dyn QuarantineSink>,
    source: String,

    prev_local_ts: Option<i64>,
    prev_is_snapshot: bool,
    expected_stream: Option<(String, String)>,
    last_source: Option<String>,

    batch_local_ts: Option<i64>,
    batch_is_snapshot: Option<bool>,
    batch_resets_book: bool,
    batch_ts_exch_us: Option<i64>,
    updates: Vec<L2Update>,

    pending_row: Option<L2Row>,
    skip_batch: bool,
    finished: bool,
}

impl<'a, I> L2Batcher<'a, I>
where
    I: Iterator<Item = Result<L2Row, BacktestError>>,
{
    /// Create a batcher over a row stream.
    ///
    /// `source` overrides the per-row source in quarantine records when
    /// non-empty.
    pub fn new(
        rows: I,
        quantizer: Quantizer,
        failure_policy: FailurePolicy,
        quarantine_action: QuarantineAction,
        sink: Option<&'a mut dyn QuarantineSink>,
        source: &str,
    ) -> Self {
        Self {
            rows,
            quantizer,
            failure_policy,
            quarantine_action,
            sink,
            source: source.to_string(),
            prev_local_ts: None,
            prev_is_snapshot: false,
            expected_stream: None,
            last_source: None,
            batch_local_ts: None,
            batch_is_snapshot: None,
            batch_resets_book: false,
            batch_ts_exch_us: None,
            updates: Vec::new(),
            pending_row: None,
            skip_batch: false,
            finished: false,
        }
    }

    /// Record the violation and decide how to proceed. Hard-fail and halt
    /// both surface the error after (halt) or without (hard-fail)
    /// recording it.
    fn handle_violation(
        &mut self,
        err: BacktestError,
        source: &str,
        line_number: u64,
        payload: Value,
    ) -> Result<Resume, BacktestError> {
        let record = QuarantineRecord {
            reason: err.to_string(),
            source: source.to_string(),
            line_number,
            payload,
        };
        let sink = reborrow_sink(&mut self.sink);
        record_quarantine(self.failure_policy, sink, &record)?;
        if self.failure_policy == FailurePolicy::HardFail
            || self.quarantine_action == QuarantineAction::Halt
        {
            return Err(err);
        }
        warn!(source, line_number, reason = %record.reason, "quarantined row");
        match self.quarantine_action {
            QuarantineAction::SkipRow => Ok(Resume::Row),
            _ => Ok(Resume::Batch),
        }
    }

    fn start_batch(&mut self, row: &L2Row) {
        self.batch_local_ts = Some(row.local_timestamp_us);
        self.batch_is_snapshot = Some(row.is_snapshot);
        self.batch_resets_book = !self.prev_is_snapshot && row.is_snapshot;
    }

    fn clear_batch(&mut self) {
        self.batch_local_ts = None;
        self.batch_is_snapshot = None;
        self.batch_resets_book = false;
        self.batch_ts_exch_us = None;
        self.updates.clear();
    }

    /// Build the in-progress batch and advance the snapshot watermark.
    fn take_batch(&mut self) -> Result<L2Batch, BacktestError> {
        let local_ts = self
            .batch_local_ts
            .ok_or_else(|| BacktestError::schema("no batch in progress"))?;
        let exch_us = self
            .batch_ts_exch_us
            .ok_or_else(|| BacktestError::schema("missing exchange timestamp in batch"))?;
        let batch = L2Batch {
            ts_recv_ns: us_to_ns(local_ts)?,
            ts_exch_ns: us_to_ns(exch_us)?,
            resets_book: self.batch_resets_book,
            updates: std::mem::take(&mut self.updates),
        };
        self.prev_is_snapshot = self.batch_is_snapshot.unwrap_or(false);
        self.clear_batch();
        Ok(batch)
    }

    /// Run one row through the invariant chain. Returns a completed batch
    /// when the row opens a new local-timestamp run; the row itself is
    /// stashed and re-processed on the next pull.
    fn process_row(&mut self, row: L2Row) -> Result<Option<L2Batch>, BacktestError> {
        let row_source = if self.source.is_empty() {
            row.source.clone()
        } else {
            self.source.clone()
        };
        self.last_source = Some(row_source.clone());

        // Invariant 1: fixed (exchange, symbol).
        match &self.expected_stream {
            None => {
                self.expected_stream = Some((row.exchange.clone(), row.symbol.clone()));
            }
            Some((exchange, symbol)) => {
                if row.exchange != *exchange || row.symbol != *symbol {
                    let err = BacktestError::schema(format!(
                        "mixed exchange/symbol in stream: {}/{}",
                        row.exchange, row.symbol
                    ));
                    let resume = self.handle_violation(
                        err,
                        &row_source,
                        row.line_number,
                        row.payload_json(),
                    )?;
                    match resume {
                        Resume::Row => {
                            self.prev_local_ts = Some(row.local_timestamp_us);
                            return Ok(None);
                        }
                        Resume::Batch => {
                            if self.batch_local_ts.is_none() {
                                self.batch_local_ts = Some(row.local_timestamp_us);
                            }
                            self.skip_batch = true;
                            self.updates.clear();
                            self.batch_ts_exch_us = None;
                            self.prev_local_ts = Some(row.local_timestamp_us);
                            return Ok(None);
                        }
                    }
                }
            }
        }

        // Invariant 2: non-decreasing local timestamp.
        if let Some(prev) = self.prev_local_ts {
            if row.local_timestamp_us < prev {
                let err = BacktestError::ordering(format!(
                    "local_timestamp decreased: {} < {prev}",
                    row.local_timestamp_us
                ));
                // The monotone watermark stays untouched on skip.
                self.handle_violation(err, &row_source, row.line_number, row.payload_json())?;
                return Ok(None);
            }
        }

        // An active skip-batch swallows rows sharing the offending
        // timestamp.
        if self.skip_batch {
            if self.batch_local_ts == Some(row.local_timestamp_us) {
                self.prev_local_ts = Some(row.local_timestamp_us);
                return Ok(None);
            }
            self.skip_batch = false;
            self.clear_batch();
        }

        // Invariant 3: batch boundary at a new local timestamp.
        if let Some(batch_ts) = self.batch_local_ts {
            if row.local_timestamp_us != batch_ts {
                if !self.updates.is_empty() && self.batch_ts_exch_us.is_none() {
                    let err = BacktestError::schema("missing exchange timestamp in batch");
                    self.handle_violation(
                        err,
                        &row_source,
                        row.line_number,
                        row.payload_json(),
                    )?;
                    self.updates.clear();
                }
                if !self.updates.is_empty() {
                    let batch = self.take_batch()?;
                    self.pending_row = Some(row);
                    return Ok(Some(batch));
                }
                self.clear_batch();
            }
        }
        if self.batch_local_ts.is_none() {
            self.start_batch(&row);
        }

        // Invariant 4: constant is_snapshot within the batch.
        if let Some(batch_snapshot) = self.batch_is_snapshot {
            if row.is_snapshot != batch_snapshot {
                let err = BacktestError::schema(
                    "mixed is_snapshot values within a local_timestamp batch",
                );
                let resume = self.handle_violation(
                    err,
                    &row_source,
                    row.line_number,
                    row.payload_json(),
                )?;
                match resume {
                    Resume::Row => {
                        self.prev_local_ts = Some(row.local_timestamp_us);
                        return Ok(None);
                    }
                    Resume::Batch => {
                        self.skip_batch = true;
                        self.updates.clear();
                        self.batch_ts_exch_us = None;
                        self.prev_local_ts = Some(row.local_timestamp_us);
                        return Ok(None);
                    }
                }
            }
        }

        // Quantize; failures carry the line for provenance.
        let quantized = self
            .quantizer
            .quantize_price(&row.price)
            .and_then(|price| {
                self.quantizer
                    .quantize_amount(&row.amount)
                    .map(|amount| (price, amount))
            });
        let (price_ticks, amount_lots) = match quantized {
            Ok(pair) => pair,
            Err(err) => {
                let wrapped = BacktestError::quantization(format!(
                    "{} at line {}",
                    err.detail(),
                    row.line_number
                ));
                let resume = self.handle_violation(
                    wrapped,
                    &row_source,
                    row.line_number,
                    row.payload_json(),
                )?;
                match resume {
                    Resume::Row => {
                        self.prev_local_ts = Some(row.local_timestamp_us);
                        return Ok(None);
                    }
                    Resume::Batch => {
                        self.skip_batch = true;
                        self.updates.clear();
                        self.batch_ts_exch_us = None;
                        self.prev_local_ts = Some(row.local_timestamp_us);
                        return Ok(None);
                    }
                }
            }
        };

        self.updates.push(L2Update {
            side: row.side,
            price_ticks,
            amount_lots,
            is_snapshot: row.is_snapshot,
        });
        self.batch_ts_exch_us = Some(row.timestamp_us);
        self.prev_local_ts = Some(row.local_timestamp_us);
        Ok(None)
    }

    /// Flush the trailing batch once the row stream is exhausted.
    fn finalize(&mut self) -> Result<Option<L2Batch>, BacktestError> {
        if self.batch_local_ts.is_none() || self.updates.is_empty() {
            return Ok(None);
        }
        if self.batch_ts_exch_us.is_none() {
            let source = if self.source.is_empty() {
                self.last_source.clone().unwrap_or_default()
            } else {
                self.source.clone()
            };
            let err = BacktestError::schema("missing exchange timestamp in batch");
            self.handle_violation(err, &source, 0, Value::Null)?;
            return Ok(None);
        }
        self.take_batch().map(Some)
    }
}

impl<I> Iterator for L2Batcher<'_, I>
where
    I: Iterator<Item = Result<L2Row, BacktestError>>,
{
    type Item = Result<L2Batch, BacktestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let row = match self.pending_row.take() {
                Some(row) => row,
                None => match self.rows.next() {
                    Some(Ok(row)) => row,
                    Some(Err(err)) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                    None => {
                        self.finished = true;
                        return match self.finalize() {
                            Ok(Some(batch)) => Some(Ok(batch)),
                            Ok(None) => None,
                            Err(err) => Some(Err(err)),
                        };
                    }
                },
            };
            match self.process_row(row) {
                Ok(Some(batch)) => return Some(Ok(batch)),
                Ok(None) => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

fn us_to_ns(us: i64) -> Result<TsNs, BacktestError> {
    us.checked_mul(1_000)
        .ok_or_else(|| BacktestError::schema(format!("timestamp out of i64 range: {us}")))
}
