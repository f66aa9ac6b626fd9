//! Binary event log format.
//!
//! All multi-byte integers are little-endian.
//!
//! # File Header
//!
//! ```text
//! magic:          8 bytes = "MMEVLOG\0"
//! version:        u8      = 1
//! endian:         u8      = 1 (little)
//! flags:          u16     = 0
//! reserved:       u32     = 0
//! exchange_id:    u64             (v1 only)
//! symbol_id:      u64             (v1 only)
//! quantizer_hash: 32 bytes        (v1 only)
//! ```
//!
//! A v1 header is 64 bytes (16-byte base + 48-byte extension). Readers
//! also accept the 16-byte v0 base header for back-compat; all fields
//! beyond the base are absent in v0.
//!
//! # Record Header (8 bytes)
//!
//! ```text
//! rec_type: u8    (1 = L2_BATCH)
//! flags:    u8    = 0
//! reserved: u16   = 0
//! length:   u32   (payload bytes; must be a multiple of 8)
//! ```
//!
//! # L2 Batch Payload
//!
//! ```text
//! ts_recv_ns:   i64
//! ts_exch_ns:   i64
//! resets_book:  u8 in {0,1}
//! pad:          3 bytes = 0
//! update_count: u32
//! ```
//!
//! followed by `update_count` 24-byte updates:
//!
//! ```text
//! side:        u8 in {0,1}
//! is_snapshot: u8 in {0,1}
//! reserved16:  u16 = 0
//! price_ticks: i64 (> 0)
//! amount_lots: i64 (>= 0)
//! reserved32:  u32 = 0
//! ```

use crate::core::error::BacktestError;
use std::io::Read;

/// Magic bytes identifying an event log file.
pub const MAGIC: &[u8; 8] = b"MMEVLOG\0";

/// Current event log format version.
pub const EVLOG_VERSION: u8 = 1;

/// Endianness marker for little-endian files.
pub const ENDIAN_LITTLE: u8 = 1;

/// Size of the version-independent header base in bytes.
pub const HEADER_BASE_SIZE: usize = 16;

/// Size of the v1 header extension in bytes.
pub const HEADER_V1_EXTRA_SIZE: usize = 48;

/// Total size of a v1 header in bytes.
pub const HEADER_V1_SIZE: usize = HEADER_BASE_SIZE + HEADER_V1_EXTRA_SIZE;

/// Size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Size of the fixed L2 batch payload header in bytes.
pub const L2_BATCH_HEADER_SIZE: usize = 24;

/// Size of a single encoded L2 update in bytes.
pub const L2_UPDATE_SIZE: usize = 24;

/// Record type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A batch of L2 price-level updates.
    L2Batch = 1,
}

/// A decoded event log header.
///
/// The identifier and hash fields are `None` for v0 files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvlogHeader {
    /// Format version (0 or 1).
    pub version: u8,
    /// Endianness marker; always little-endian.
    pub endian: u8,
    /// Header flags; currently always zero.
    pub flags: u16,
    /// Low 8 bytes of the sha256 of the exchange name, little-endian.
    pub exchange_id: Option<u64>,
    /// Low 8 bytes of the sha256 of the symbol, little-endian.
    pub symbol_id: Option<u64>,
    /// sha256 of the quantizer's canonical descriptor.
    pub quantizer_hash: Option<[u8; 32]>,
}

/// Encode a v1 header.
#[must_use]
pub fn pack_header(exchange_id: u64, symbol_id: u64, quantizer_hash: &[u8; 32]) -> [u8; HEADER_V1_SIZE] {
    let mut buf = [0u8; HEADER_V1_SIZE];
    buf[..8].copy_from_slice(MAGIC);
    buf[8] = EVLOG_VERSION;
    buf[9] = ENDIAN_LITTLE;
    // flags (u16) and reserved (u32) stay zero.
    buf[16..24].copy_from_slice(&exchange_id.to_le_bytes());
    buf[24..32].copy_from_slice(&symbol_id.to_le_bytes());
    buf[32..64].copy_from_slice(quantizer_hash);
    buf
}

/// Read and validate an event log header from a stream.
///
/// Accepts v1 (64 bytes) and the v0 base header (16 bytes).
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] on bad magic, unsupported
/// version/endianness, non-zero reserved fields, or truncation.
pub fn read_header(reader: &mut impl Read) -> Result<EvlogHeader, BacktestError> {
    let mut base = [0u8; HEADER_BASE_SIZE];
    read_exact_schema(reader, &mut base, "evlog header")?;

    if &base[..8] != MAGIC {
        return Err(BacktestError::schema("invalid evlog magic"));
    }
    let version = base[8];
    let endian = base[9];
    let flags = u16::from_le_bytes([base[10], base[11]]);
    let reserved = u32::from_le_bytes([base[12], base[13], base[14], base[15]]);
    if endian != ENDIAN_LITTLE {
        return Err(BacktestError::schema(format!(
            "unsupported evlog endian: {endian}"
        )));
    }
    if reserved != 0 {
        return Err(BacktestError::schema("non-zero header reserved field"));
    }

    match version {
        0 => Ok(EvlogHeader {
            version,
            endian,
            flags,
            exchange_id: None,
            symbol_id: None,
            quantizer_hash: None,
        }),
        EVLOG_VERSION => {
            let mut extra = [0u8; HEADER_V1_EXTRA_SIZE];
            read_exact_schema(reader, &mut extra, "evlog header")?;
            let exchange_id = u64::from_le_bytes(extra[..8].try_into().unwrap_or_default());
            let symbol_id = u64::from_le_bytes(extra[8..16].try_into().unwrap_or_default());
            let mut quantizer_hash = [0u8; 32];
            quantizer_hash.copy_from_slice(&extra[16..48]);
            Ok(EvlogHeader {
                version,
                endian,
                flags,
                exchange_id: Some(exchange_id),
                symbol_id: Some(symbol_id),
                quantizer_hash: Some(quantizer_hash),
            })
        }
        other => Err(BacktestError::schema(format!(
            "unsupported evlog version: {other}"
        ))),
    }
}

/// Encode a record header.
#[must_use]
pub fn pack_record_header(rec_type: RecordType, payload_len: u32) -> [u8; RECORD_HEADER_SIZE] {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    buf[0] = rec_type as u8;
    // flags (u8) and reserved (u16) stay zero.
    buf[4..8].copy_from_slice(&payload_len.to_le_bytes());
    buf
}

/// Decode and validate a record header, returning `(rec_type, length)`.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] on non-zero flags or reserved
/// fields. The record type byte is returned raw; unknown types are
/// rejected by the reader.
pub fn unpack_record_header(buf: &[u8; RECORD_HEADER_SIZE]) -> Result<(u8, u32), BacktestError> {
    let rec_type = buf[0];
    let flags = buf[1];
    let reserved = u16::from_le_bytes([buf[2], buf[3]]);
    let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if flags != 0 {
        return Err(BacktestError::schema("non-zero record flags"));
    }
    if reserved != 0 {
        return Err(BacktestError::schema("non-zero record reserved field"));
    }
    Ok((rec_type, length))
}

fn read_exact_schema(
    reader: &mut impl Read,
    buf: &mut [u8],
    what: &str,
) -> Result<(), BacktestError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Err(BacktestError::schema(format!("missing {what}")));
            }
            return Err(BacktestError::schema(format!("truncated {what}")));
        }
        filled += n;
    }
    Ok(())
}
