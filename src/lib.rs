//! # Deterministic L2 Market-Data Backtester
//!
//! A deterministic backtester for limit-order-book venues. The crate
//! ingests vendor L2 (level-2) order-book update CSV streams, compiles
//! them into a compact binary event log with a time index and a signed
//! manifest, and later replays the log through an in-memory book to
//! drive a trading strategy, producing fills, an equity curve, and
//! Sharpe/PSR/DSR statistics.
//!
//! ## Key Properties
//!
//! - **Integer state everywhere**: prices, sizes, cash, and returns are
//!   signed 64-bit integers (ticks, lots, quote atoms, basis points).
//!   Decimal inputs quantize exactly or are rejected; floats appear only
//!   in the final metrics and never feed back into state.
//! - **Bit-exact on-disk formats**: the event log, its index, the
//!   manifest, and the tape are byte-reproducible functions of their
//!   inputs. Compiling the same data twice yields identical files,
//!   manifest hash included.
//! - **Strict by default**: the writer, reader, index, book, portfolio,
//!   and engine never silently skip. The only configurable leniencies
//!   are the ingest quarantine policy and the engine's
//!   `ignore_risk_rejects` flag for cash/position shortfalls.
//! - **Single-threaded, synchronous**: one logical thread owns a compile
//!   pipeline or a replay session. All I/O is blocking file I/O behind
//!   exclusively owned handles; lazy producers are hand-written pull
//!   iterators.
//!
//! ## Pipeline
//!
//! ```text
//! CSV rows ──> batcher (quantizer) ──> writer ──> .evlog + .idx + manifest
//! .evlog ──> reader ──> book ──> strategy ──> engine ──> fills, equity, tape
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use l2_backtest::prelude::*;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), BacktestError> {
//! let quantizer = Quantizer::from_strs("0.01", "0.001")?;
//! let options = CompileOptions::new(
//!     vec![PathBuf::from("btcusdt.csv.gz")],
//!     PathBuf::from("out"),
//!     quantizer,
//! );
//! let compiled = compile_l2_csv(&options)?;
//!
//! let mut strategy = AlternatingMarketOrderStrategy::new(1)?;
//! let fees = FixedBpsFeeModel::new(10)?;
//! let config = RunConfig::with_initial_cash(1_000_000);
//! let result = run_backtest(
//!     &compiled.evlog_path,
//!     Some(&compiled.index_path),
//!     &mut strategy,
//!     &fees,
//!     &config,
//!     None,
//!     None,
//! )?;
//! println!("fills={} sharpe={:.4}", result.fills.len(), result.sharpe);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] — domain types, errors, decimal parsing, hashing, the
//!   fixed-point quantizer, and failure-policy configuration
//! - [`evlog`] — the binary event log format, writer, reader, and index
//! - [`ingest`] — vendor CSV parsing, the batcher, quarantine sinks,
//!   increment inference, file location, and the compiler
//! - [`book`] — the reference L2 book and the `Book` capability trait
//! - [`sim`] — the replay engine, portfolio, fee models, and tape
//! - [`metrics`] — bps return series and Sharpe/PSR/DSR
//! - [`strategy`] — the strategy interface and reference strategies

pub mod book;
pub mod core;
pub mod evlog;
pub mod ingest;
pub mod metrics;
pub mod prelude;
pub mod sim;
pub mod strategy;
