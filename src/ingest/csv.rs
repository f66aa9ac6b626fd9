//! Vendor L2 CSV readers.
//!
//! The vendor schema is a flat CSV with the exact header
//! `exchange,symbol,timestamp,local_timestamp,is_snapshot,side,price,amount`,
//! where timestamps are non-negative microseconds and prices/amounts stay
//! as decimal strings until quantization. Both `.csv` and `.csv.gz` files
//! are accepted.

use crate::core::error::BacktestError;
use crate::core::types::{Side, parse_side};
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// The exact expected CSV header.
pub const L2_HEADER: [&str; 8] = [
    "exchange",
    "symbol",
    "timestamp",
    "local_timestamp",
    "is_snapshot",
    "side",
    "price",
    "amount",
];

/// One parsed vendor CSV row.
///
/// `price` and `amount` stay as raw strings; the batcher quantizes them so
/// that quantization failures carry the row's provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Row {
    /// Exchange identifier from the row.
    pub exchange: String,
    /// Instrument symbol from the row.
    pub symbol: String,
    /// Exchange timestamp in microseconds.
    pub timestamp_us: i64,
    /// Local receive timestamp in microseconds.
    pub local_timestamp_us: i64,
    /// Whether the row belongs to an initial book snapshot.
    pub is_snapshot: bool,
    /// Book side.
    pub side: Side,
    /// Raw decimal price string.
    pub price: String,
    /// Raw decimal amount string.
    pub amount: String,
    /// 1-based source line number (data starts at line 2).
    pub line_number: u64,
    /// Path of the source file.
    pub source: String,
}

impl L2Row {
    /// The row as a JSON object for quarantine records: enum values as
    /// lowercase names, fields as key/value pairs.
    #[must_use]
    pub fn payload_json(&self) -> Value {
        json!({
            "exchange": self.exchange,
            "symbol": self.symbol,
            "timestamp_us": self.timestamp_us,
            "local_timestamp_us": self.local_timestamp_us,
            "is_snapshot": self.is_snapshot,
            "side": self.side.as_str(),
            "price": self.price,
            "amount": self.amount,
            "line_number": self.line_number,
            "source": self.source,
        })
    }
}

/// Lazy reader over the rows of one vendor CSV file.
///
/// The header is validated at open; rows are parsed on demand.
pub struct L2RowReader {
    reader: csv::Reader<Box<dyn Read>>,
    record: StringRecord,
    source: String,
    line_number: u64,
    failed: bool,
}

impl std::fmt::Debug for L2RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2RowReader")
            .field("source", &self.source)
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl L2RowReader {
    /// Open a `.csv` or `.csv.gz` file and validate its header.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the file cannot be opened and
    /// [`BacktestError::Schema`] for an empty file or unexpected header.
    pub fn open(path: &Path) -> Result<Self, BacktestError> {
        let file = File::open(path).map_err(|e| BacktestError::io_at(&e, path))?;
        let input: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut header = StringRecord::new();
        let got_header = reader
            .read_record(&mut header)
            .map_err(|e| BacktestError::schema(format!("CSV read error: {e}")))?;
        if !got_header {
            return Err(BacktestError::schema("empty CSV"));
        }
        let header_fields: Vec<&str> = header.iter().collect();
        if header_fields != L2_HEADER {
            return Err(BacktestError::schema(format!(
                "unexpected header: {header_fields:?}"
            )));
        }

        Ok(Self {
            reader,
            record: StringRecord::new(),
            source: path.to_string_lossy().into_owned(),
            line_number: 1,
            failed: false,
        })
    }

    fn parse_row(&mut self) -> Result<Option<L2Row>, BacktestError> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| BacktestError::schema(format!("CSV read error: {e}")))?;
        if !more {
            return Ok(None);
        }
        self.line_number += 1;
        let line_number = self.line_number;

        if self.record.len() != L2_HEADER.len() {
            return Err(BacktestError::schema(format!(
                "row length {} != {} at line {line_number}",
                self.record.len(),
                L2_HEADER.len()
            )));
        }

        let exchange = require_str(&self.record[0], "exchange")?.to_string();
        let symbol = require_str(&self.record[1], "symbol")?.to_string();
        let timestamp_us = parse_int_field(&self.record[2], "timestamp")?;
        let local_timestamp_us = parse_int_field(&self.record[3], "local_timestamp")?;
        let is_snapshot = parse_bool_field(&self.record[4], "is_snapshot")?;
        let side = parse_side(&self.record[5])?;
        let price = self.record[6].to_string();
        let amount = self.record[7].to_string();

        Ok(Some(L2Row {
            exchange,
            symbol,
            timestamp_us,
            local_timestamp_us,
            is_snapshot,
            side,
            price,
            amount,
            line_number,
            source: self.source.clone(),
        }))
    }
}

impl Iterator for L2RowReader {
    type Item = Result<L2Row, BacktestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.parse_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

fn require_str<'a>(value: &'a str, field: &str) -> Result<&'a str, BacktestError> {
    if value.is_empty() {
        return Err(BacktestError::schema(format!("{field} empty")));
    }
    Ok(value)
}

/// Parse a non-negative microsecond timestamp. Digits only, so signs and
/// whitespace are rejected outright.
fn parse_int_field(value: &str, field: &str) -> Result<i64, BacktestError> {
    if value.is_empty() {
        return Err(BacktestError::schema(format!("{field} empty")));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BacktestError::schema(format!(
            "{field} not an integer: {value:?}"
        )));
    }
    value
        .parse::<i64>()
        .map_err(|_| BacktestError::schema(format!("{field} out of range: {value:?}")))
}

fn parse_bool_field(value: &str, field: &str) -> Result<bool, BacktestError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(BacktestError::schema(format!("{field} invalid: {value:?}"))),
    }
}
