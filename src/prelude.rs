//! Prelude re-exporting the commonly used types and entry points.
//!
//! ```rust
//! use l2_backtest::prelude::*;
//! ```

// Core types and errors
pub use crate::core::{
    BacktestError, Bps, FailurePolicy, Lots, OrderingKey, QuarantineAction, Quantizer, QuoteAtoms,
    Side, Ticks, TsNs,
};

// Event log
pub use crate::evlog::{EvlogReader, EvlogWriter, IndexEntry, L2Batch, L2Update};

// Ingest and compile
pub use crate::ingest::{
    CompileOptions, CompileResult, DataLocator, JsonlQuarantineSink, L2Batcher, L2Row, L2RowReader,
    QuarantineRecord, QuarantineSink, VecQuarantineSink, compile_l2_csv, infer_l2_increments,
};

// Book
pub use crate::book::{Book, LevelBook};

// Simulation
pub use crate::sim::{
    FeeModel, Fill, FixedBpsFeeModel, Portfolio, RunConfig, RunResult, TapeWriter,
    iter_best_bid_ask, run_backtest,
};

// Metrics
pub use crate::metrics::{
    deflated_sharpe_ratio, probabilistic_sharpe_ratio, returns_from_equity, sharpe_ratio,
};

// Strategies
pub use crate::strategy::{
    Action, AlternatingMarketOrderStrategy, BookSnapshot, RandomMarketOrderStrategy, Strategy,
    StrategyContext,
};
