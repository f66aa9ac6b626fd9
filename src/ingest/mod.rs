//! Ingest pipeline: vendor CSV parsing, batching, quarantine routing,
//! increment inference, file location, and the compiler that ties them
//! into an event log with its index and manifest.

pub mod batcher;
pub mod compiler;
pub mod csv;
pub mod infer;
pub mod locator;
pub mod quarantine;

pub use batcher::L2Batcher;
pub use compiler::{
    COMPILER_VERSION, CompileOptions, CompileResult, MANIFEST_VERSION, compile_l2_csv,
};
pub use csv::{L2_HEADER, L2Row, L2RowReader};
pub use infer::infer_l2_increments;
pub use locator::DataLocator;
pub use quarantine::{
    JsonlQuarantineSink, QuarantineRecord, QuarantineSink, VecQuarantineSink, record_quarantine,
};
