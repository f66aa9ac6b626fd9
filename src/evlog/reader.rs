//! Binary event log reader.
//!
//! [`EvlogReader`] validates the file header at open, then yields batches
//! lazily in file order through [`iter_l2_batches`]
//! (EvlogReader::iter_l2_batches). With an index attached,
//! [`seek_time`](EvlogReader::seek_time) positions the reader at the
//! first batch at or after a target timestamp via binary search on a
//! cached timestamp array. Any truncated record, unknown record type, or
//! misaligned payload is a schema failure.

use crate::core::error::BacktestError;
use crate::core::types::{Side, TsNs};
use crate::evlog::format::{
    EvlogHeader, L2_BATCH_HEADER_SIZE, L2_UPDATE_SIZE, RECORD_HEADER_SIZE, RecordType, read_header,
    unpack_record_header,
};
use crate::evlog::index::{IndexEntry, read_index};
use crate::evlog::types::{L2Batch, L2Update};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Random-access reader for a single event log file.
#[derive(Debug)]
pub struct EvlogReader {
    file: BufReader<File>,
    header: EvlogHeader,
    index: Option<Vec<IndexEntry>>,
    index_ts: Option<Vec<TsNs>>,
}

impl EvlogReader {
    /// Open an event log and validate its header.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the file cannot be opened and
    /// [`BacktestError::Schema`] on a malformed header.
    pub fn open(path: &Path) -> Result<Self, BacktestError> {
        let file = File::open(path).map_err(|e| BacktestError::io_at(&e, path))?;
        let mut file = BufReader::new(file);
        let header = read_header(&mut file)?;
        Ok(Self {
            file,
            header,
            index: None,
            index_ts: None,
        })
    }

    /// Open an event log together with its time index.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus any index validation failure.
    pub fn open_with_index(path: &Path, index_path: &Path) -> Result<Self, BacktestError> {
        let mut reader = Self::open(path)?;
        let index = read_index(index_path)?;
        reader.index_ts = Some(index.iter().map(|e| e.ts_recv_ns).collect());
        reader.index = Some(index);
        Ok(reader)
    }

    /// The validated file header.
    #[must_use]
    pub fn header(&self) -> &EvlogHeader {
        &self.header
    }

    /// Position the reader at the first batch with `ts_recv_ns >= target`.
    ///
    /// If no such batch exists, the reader is positioned at end-of-file
    /// and subsequent iteration yields nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] if no index was opened, and
    /// [`BacktestError::Io`] if the seek fails.
    pub fn seek_time(&mut self, target: TsNs) -> Result<(), BacktestError> {
        let (index, index_ts) = match (&self.index, &self.index_ts) {
            (Some(index), Some(ts)) => (index, ts),
            _ => return Err(BacktestError::schema("index not available")),
        };
        let idx = index_ts.partition_point(|&ts| ts < target);
        if idx >= index.len() {
            self.file.seek(SeekFrom::End(0))?;
            return Ok(());
        }
        let offset = u64::try_from(index[idx].offset)
            .map_err(|_| BacktestError::schema("negative index offset"))?;
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Iterate batches from the current position in file order.
    pub fn iter_l2_batches(&mut self) -> L2BatchIter<'_> {
        L2BatchIter {
            file: &mut self.file,
            done: false,
        }
    }
}

/// Lazy iterator over the L2 batch records of an [`EvlogReader`].
#[derive(Debug)]
pub struct L2BatchIter<'a> {
    file: &'a mut BufReader<File>,
    done: bool,
}

impl L2BatchIter<'_> {
    fn read_next(&mut self) -> Result<Option<L2Batch>, BacktestError> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        match read_fully(self.file, &mut header)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial => {
                return Err(BacktestError::schema("truncated record header"));
            }
            ReadOutcome::Full => {}
        }

        let (rec_type, payload_len) = unpack_record_header(&header)?;
        let payload_len = payload_len as usize;
        if payload_len % 8 != 0 {
            return Err(BacktestError::schema("payload length not 8-byte aligned"));
        }
        let mut payload = vec![0u8; payload_len];
        match read_fully(self.file, &mut payload)? {
            ReadOutcome::Full => {}
            _ => return Err(BacktestError::schema("truncated payload")),
        }

        if rec_type == RecordType::L2Batch as u8 {
            decode_l2_payload(&payload).map(Some)
        } else {
            Err(BacktestError::schema(format!(
                "unknown record type: {rec_type}"
            )))
        }
    }
}

impl Iterator for L2BatchIter<'_> {
    type Item = Result<L2Batch, BacktestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

enum ReadOutcome {
    Full,
    Partial,
    Eof,
}

fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<ReadOutcome, BacktestError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 {
                ReadOutcome::Eof
            } else {
                ReadOutcome::Partial
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

fn decode_l2_payload(payload: &[u8]) -> Result<L2Batch, BacktestError> {
    if payload.len() < L2_BATCH_HEADER_SIZE {
        return Err(BacktestError::schema("l2 payload too small"));
    }
    let ts_recv_ns = i64::from_le_bytes(payload[..8].try_into().unwrap_or_default());
    let ts_exch_ns = i64::from_le_bytes(payload[8..16].try_into().unwrap_or_default());
    let resets_book = payload[16];
    let update_count =
        u32::from_le_bytes(payload[20..24].try_into().unwrap_or_default()) as usize;

    if ts_recv_ns < 0 || ts_exch_ns < 0 {
        return Err(BacktestError::schema("negative timestamp"));
    }
    if resets_book > 1 {
        return Err(BacktestError::schema(format!(
            "invalid resets_book flag: {resets_book}"
        )));
    }
    let expected_len = L2_BATCH_HEADER_SIZE
        .checked_add(
            update_count
                .checked_mul(L2_UPDATE_SIZE)
                .ok_or_else(|| BacktestError::schema("l2 payload size mismatch"))?,
        )
        .ok_or_else(|| BacktestError::schema("l2 payload size mismatch"))?;
    if payload.len() != expected_len {
        return Err(BacktestError::schema("l2 payload size mismatch"));
    }

    let mut updates = Vec::with_capacity(update_count);
    for chunk in payload[L2_BATCH_HEADER_SIZE..].chunks_exact(L2_UPDATE_SIZE) {
        let side_value = chunk[0];
        let is_snapshot = chunk[1];
        let reserved16 = u16::from_le_bytes([chunk[2], chunk[3]]);
        let price_ticks = i64::from_le_bytes(chunk[4..12].try_into().unwrap_or_default());
        let amount_lots = i64::from_le_bytes(chunk[12..20].try_into().unwrap_or_default());
        let reserved32 = u32::from_le_bytes(chunk[20..24].try_into().unwrap_or_default());

        if reserved16 != 0 || reserved32 != 0 {
            return Err(BacktestError::schema("non-zero l2 update reserved fields"));
        }
        let side = match side_value {
            0 => Side::Bid,
            1 => Side::Ask,
            other => {
                return Err(BacktestError::schema(format!("invalid side: {other}")));
            }
        };
        if is_snapshot > 1 {
            return Err(BacktestError::schema(format!(
                "invalid is_snapshot flag: {is_snapshot}"
            )));
        }
        if price_ticks <= 0 {
            return Err(BacktestError::schema("non-positive price_ticks"));
        }
        if amount_lots < 0 {
            return Err(BacktestError::schema("negative amount_lots"));
        }
        updates.push(L2Update {
            side,
            price_ticks,
            amount_lots,
            is_snapshot: is_snapshot == 1,
        });
    }

    Ok(L2Batch {
        ts_recv_ns,
        ts_exch_ns,
        resets_book: resets_book == 1,
        updates,
    })
}
