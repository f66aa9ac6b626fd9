//! Event log time index (`ts_recv_ns` → file offset).
//!
//! The `.idx` sidecar maps batch receive timestamps to the byte offset of
//! their record in the event log, enabling binary-search seeks.
//!
//! # On-Disk Layout (little-endian)
//!
//! ```text
//! magic:    8 bytes = "MMEVLIDX"
//! version:  u8      = 0
//! endian:   u8      = 1
//! flags:    u16     = 0
//! reserved: u32     = 0
//! entries:  repeated (ts_recv_ns: i64, offset: i64)
//! ```
//!
//! Timestamps must be non-decreasing and offsets strictly increasing;
//! both writer and reader enforce this.

use crate::core::error::BacktestError;
use crate::core::types::TsNs;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes identifying an index file.
pub const INDEX_MAGIC: &[u8; 8] = b"MMEVLIDX";

/// Current index format version.
pub const INDEX_VERSION: u8 = 0;

/// Size of the index header in bytes.
pub const INDEX_HEADER_SIZE: usize = 16;

/// Size of one index entry in bytes.
pub const INDEX_ENTRY_SIZE: usize = 16;

/// One index entry: a batch timestamp and its record's file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Local receive timestamp of the referenced batch.
    pub ts_recv_ns: TsNs,
    /// Byte offset of the record header within the event log.
    pub offset: i64,
}

/// Write an index file, validating entry monotonicity.
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for negative fields,
/// non-monotone timestamps, or non-increasing offsets, and
/// [`BacktestError::Io`] on write failure.
pub fn write_index(path: &Path, entries: &[IndexEntry]) -> Result<usize, BacktestError> {
    let file = File::create(path).map_err(|e| BacktestError::io_at(&e, path))?;
    let mut writer = BufWriter::new(file);

    let mut header = [0u8; INDEX_HEADER_SIZE];
    header[..8].copy_from_slice(INDEX_MAGIC);
    header[8] = INDEX_VERSION;
    header[9] = 1; // little-endian
    writer
        .write_all(&header)
        .map_err(|e| BacktestError::io_at(&e, path))?;

    let mut prev: Option<&IndexEntry> = None;
    for entry in entries {
        validate_entry(entry, prev)?;
        writer
            .write_all(&entry.ts_recv_ns.to_le_bytes())
            .map_err(|e| BacktestError::io_at(&e, path))?;
        writer
            .write_all(&entry.offset.to_le_bytes())
            .map_err(|e| BacktestError::io_at(&e, path))?;
        prev = Some(entry);
    }
    writer.flush().map_err(|e| BacktestError::io_at(&e, path))?;
    Ok(entries.len())
}

/// Read and validate an index file.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] on a bad header, a payload that is
/// not a whole number of entries, or broken monotonicity, and
/// [`BacktestError::Io`] on read failure.
pub fn read_index(path: &Path) -> Result<Vec<IndexEntry>, BacktestError> {
    let mut file = File::open(path).map_err(|e| BacktestError::io_at(&e, path))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| BacktestError::io_at(&e, path))?;

    if data.len() < INDEX_HEADER_SIZE {
        return Err(BacktestError::schema("invalid index header size"));
    }
    let (header, body) = data.split_at(INDEX_HEADER_SIZE);
    if &header[..8] != INDEX_MAGIC {
        return Err(BacktestError::schema("invalid index magic"));
    }
    if header[8] != INDEX_VERSION {
        return Err(BacktestError::schema(format!(
            "unsupported index version: {}",
            header[8]
        )));
    }
    if header[9] != 1 {
        return Err(BacktestError::schema(format!(
            "unsupported index endian: {}",
            header[9]
        )));
    }
    if header[12..16] != [0u8; 4] {
        return Err(BacktestError::schema("non-zero index reserved field"));
    }
    if body.len() % INDEX_ENTRY_SIZE != 0 {
        return Err(BacktestError::schema("index payload size mismatch"));
    }

    let mut entries = Vec::with_capacity(body.len() / INDEX_ENTRY_SIZE);
    for chunk in body.chunks_exact(INDEX_ENTRY_SIZE) {
        let ts_recv_ns = i64::from_le_bytes(chunk[..8].try_into().unwrap_or_default());
        let offset = i64::from_le_bytes(chunk[8..].try_into().unwrap_or_default());
        let entry = IndexEntry { ts_recv_ns, offset };
        validate_entry(&entry, entries.last())?;
        entries.push(entry);
    }
    Ok(entries)
}

fn validate_entry(entry: &IndexEntry, prev: Option<&IndexEntry>) -> Result<(), BacktestError> {
    if entry.ts_recv_ns < 0 {
        return Err(BacktestError::schema(format!(
            "negative index timestamp: {}",
            entry.ts_recv_ns
        )));
    }
    if entry.offset < 0 {
        return Err(BacktestError::schema(format!(
            "negative index offset: {}",
            entry.offset
        )));
    }
    if let Some(prev) = prev {
        if entry.ts_recv_ns < prev.ts_recv_ns {
            return Err(BacktestError::ordering("index timestamps not monotone"));
        }
        if entry.offset <= prev.offset {
            return Err(BacktestError::ordering("index offsets not increasing"));
        }
    }
    Ok(())
}
