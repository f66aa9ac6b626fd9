//! Binary event log writer.
//!
//! [`EvlogWriter`] owns its file handle exclusively and appends records
//! behind a buffered writer, tracking the byte offset itself so that
//! [`tell`](EvlogWriter::tell) never needs to flush. The header is
//! written at creation; [`finish`](EvlogWriter::finish) flushes and
//! closes.

use crate::core::error::BacktestError;
use crate::core::types::Side;
use crate::evlog::format::{
    HEADER_V1_SIZE, L2_BATCH_HEADER_SIZE, L2_UPDATE_SIZE, RecordType, pack_header,
    pack_record_header,
};
use crate::evlog::types::L2Batch;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Append-only writer for a single event log file.
#[derive(Debug)]
pub struct EvlogWriter {
    file: BufWriter<File>,
    path: PathBuf,
    offset: u64,
}

impl EvlogWriter {
    /// Create (truncating) an event log and write its v1 header.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the file cannot be created or
    /// written.
    pub fn create(
        path: &Path,
        exchange_id: u64,
        symbol_id: u64,
        quantizer_hash: &[u8; 32],
    ) -> Result<Self, BacktestError> {
        let file = File::create(path).map_err(|e| BacktestError::io_at(&e, path))?;
        let mut writer = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            offset: 0,
        };
        let header = pack_header(exchange_id, symbol_id, quantizer_hash);
        writer.write_all(&header)?;
        debug_assert_eq!(writer.offset, HEADER_V1_SIZE as u64);
        Ok(writer)
    }

    /// The byte offset the next record will be written at.
    ///
    /// Callers record this before [`write_l2_batch`](Self::write_l2_batch)
    /// to populate index entries.
    #[must_use]
    #[inline]
    pub fn tell(&self) -> u64 {
        self.offset
    }

    /// Validate and append one L2 batch record.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for negative timestamps,
    /// non-positive prices, negative amounts, or an update count beyond
    /// `u32`, and [`BacktestError::Io`] on write failure.
    pub fn write_l2_batch(&mut self, batch: &L2Batch) -> Result<(), BacktestError> {
        if batch.ts_recv_ns < 0 || batch.ts_exch_ns < 0 {
            return Err(BacktestError::schema("negative timestamp"));
        }
        let update_count = u32::try_from(batch.updates.len()).map_err(|_| {
            BacktestError::schema(format!(
                "update_count out of u32 range: {}",
                batch.updates.len()
            ))
        })?;
        let payload_len = L2_BATCH_HEADER_SIZE + batch.updates.len() * L2_UPDATE_SIZE;
        if payload_len % 8 != 0 {
            return Err(BacktestError::schema("l2 payload size not 8-byte aligned"));
        }

        let mut payload = Vec::with_capacity(payload_len);
        payload.extend_from_slice(&batch.ts_recv_ns.to_le_bytes());
        payload.extend_from_slice(&batch.ts_exch_ns.to_le_bytes());
        payload.push(u8::from(batch.resets_book));
        payload.extend_from_slice(&[0u8; 3]);
        payload.extend_from_slice(&update_count.to_le_bytes());

        for update in &batch.updates {
            if update.price_ticks <= 0 {
                return Err(BacktestError::schema("non-positive price_ticks"));
            }
            if update.amount_lots < 0 {
                return Err(BacktestError::schema("negative amount_lots"));
            }
            payload.push(match update.side {
                Side::Bid => 0,
                Side::Ask => 1,
            });
            payload.push(u8::from(update.is_snapshot));
            payload.extend_from_slice(&[0u8; 2]);
            payload.extend_from_slice(&update.price_ticks.to_le_bytes());
            payload.extend_from_slice(&update.amount_lots.to_le_bytes());
            payload.extend_from_slice(&[0u8; 4]);
        }
        debug_assert_eq!(payload.len(), payload_len);

        let record_header = pack_record_header(
            RecordType::L2Batch,
            u32::try_from(payload_len)
                .map_err(|_| BacktestError::schema("payload length out of u32 range"))?,
        );
        self.write_all(&record_header)?;
        self.write_all(&payload)?;
        trace!(
            ts_recv_ns = batch.ts_recv_ns,
            updates = batch.updates.len(),
            offset = self.offset,
            "appended l2 batch"
        );
        Ok(())
    }

    /// Flush buffered records and close the writer.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Io`] if the flush fails.
    pub fn finish(mut self) -> Result<(), BacktestError> {
        self.file
            .flush()
            .map_err(|e| BacktestError::io_at(&e, &self.path))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BacktestError> {
        self.file
            .write_all(bytes)
            .map_err(|e| BacktestError::io_at(&e, &self.path))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}
