//! Binary event log: format, append-only writer, random-access reader,
//! and the time index.
//!
//! # Types
//!
//! - [`L2Update`] / [`L2Batch`] — the decoded record payloads
//! - [`EvlogHeader`] — the validated file header
//! - [`EvlogWriter`] — append-only writer with offset tracking
//! - [`EvlogReader`] — header-validated lazy reader with time seeks
//! - [`IndexEntry`] — one `.idx` entry (`ts_recv_ns`, file offset)

pub mod format;
pub mod index;
pub mod reader;
pub mod types;
pub mod writer;

pub use format::{
    ENDIAN_LITTLE, EVLOG_VERSION, EvlogHeader, HEADER_BASE_SIZE, HEADER_V1_SIZE,
    L2_BATCH_HEADER_SIZE, L2_UPDATE_SIZE, MAGIC, RECORD_HEADER_SIZE, RecordType,
};
pub use index::{INDEX_MAGIC, INDEX_VERSION, IndexEntry, read_index, write_index};
pub use reader::{EvlogReader, L2BatchIter};
pub use types::{L2Batch, L2Update};
pub use writer::EvlogWriter;
