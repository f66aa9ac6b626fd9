//! Deterministic replay and market-order execution.
//!
//! [`run_backtest`] replays an event log through a book, hands each
//! complete top-of-book to the strategy, executes the returned market
//! orders against the opposite top level, and accounts every fill in the
//! portfolio. The session moves from bootstrapping to live on the first
//! complete top-of-book: while bootstrapping, a missing side may be
//! skipped (`skip_initial_missing_book`); once live, a missing or
//! non-positive top of book is fatal. `ignore_risk_rejects` is the only
//! soft path and covers cash/position shortfalls exclusively, never data
//! integrity.

use crate::book::{Book, LevelBook};
use crate::core::error::BacktestError;
use crate::core::types::{Bps, Lots, QuoteAtoms, Side, Ticks, TsNs};
use crate::evlog::reader::EvlogReader;
use crate::metrics::returns::returns_from_equity;
use crate::metrics::sharpe::{deflated_sharpe_ratio, probabilistic_sharpe_ratio, sharpe_ratio};
use crate::sim::fees::FeeModel;
use crate::sim::portfolio::Portfolio;
use crate::sim::tape::TapeWriter;
use crate::strategy::{Action, BookSnapshot, Strategy, StrategyContext};
use std::path::Path;
use tracing::{debug, info};

/// An executed market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Receive timestamp of the batch the order executed in.
    pub ts_recv_ns: TsNs,
    /// Order side.
    pub side: Side,
    /// Execution price (the opposite top of book).
    pub price_ticks: Ticks,
    /// Executed quantity, strictly positive.
    pub qty_lots: Lots,
    /// `price * qty` in quote atoms.
    pub notional: QuoteAtoms,
    /// Fee charged, non-negative.
    pub fee_atoms: QuoteAtoms,
}

/// Configuration for one replay session.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Starting cash; strictly positive.
    pub initial_cash: QuoteAtoms,
    /// Starting position.
    pub initial_position: Lots,
    /// Allow selling beyond the current position.
    pub allow_short: bool,
    /// Allow buying beyond the current cash.
    pub allow_margin: bool,
    /// Sharpe benchmark for PSR/DSR; must be finite.
    pub sr_benchmark: f64,
    /// Trial count for DSR deflation; at least 1.
    pub dsr_trials: u32,
    /// Tolerate an incomplete top of book before the first complete one.
    pub skip_initial_missing_book: bool,
    /// Silently skip orders failing cash/position checks.
    pub ignore_risk_rejects: bool,
}

impl RunConfig {
    /// A strict configuration with the given starting cash.
    #[must_use]
    pub fn with_initial_cash(initial_cash: QuoteAtoms) -> Self {
        Self {
            initial_cash,
            initial_position: 0,
            allow_short: false,
            allow_margin: false,
            sr_benchmark: 0.0,
            dsr_trials: 1,
            skip_initial_missing_book: false,
            ignore_risk_rejects: false,
        }
    }
}

/// Everything a replay session produces.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Executed fills in submission order.
    pub fills: Vec<Fill>,
    /// One `(ts_recv_ns, equity)` sample per batch.
    pub equity_curve: Vec<(TsNs, QuoteAtoms)>,
    /// Per-step returns in bps of initial cash.
    pub returns: Vec<Bps>,
    /// Sharpe ratio of the return series.
    pub sharpe: f64,
    /// Probabilistic Sharpe ratio against the configured benchmark.
    pub psr: f64,
    /// Deflated Sharpe ratio for the configured trial count.
    pub dsr: f64,
}

/// Replay an event log and execute the strategy's market orders.
///
/// The default book is a fresh [`LevelBook`]; passing `book` substitutes
/// any [`Book`] implementation. With a tape, every action, fill, and
/// equity sample is traced.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for invalid configuration, an
/// incomplete or non-positive top of book outside bootstrap, an order
/// exceeding the top-of-book size, or a risk failure without
/// `ignore_risk_rejects`; plus any reader or metrics error.
pub fn run_backtest(
    evlog_path: &Path,
    index_path: Option<&Path>,
    strategy: &mut dyn Strategy,
    fee_model: &dyn FeeModel,
    config: &RunConfig,
    book: Option<&mut dyn Book>,
    mut tape: Option<&mut TapeWriter>,
) -> Result<RunResult, BacktestError> {
    if config.initial_cash <= 0 {
        return Err(BacktestError::schema("initial_cash must be positive"));
    }
    if !config.allow_short && config.initial_position < 0 {
        return Err(BacktestError::schema("initial_position short not allowed"));
    }

    let mut portfolio = Portfolio::new(config.initial_cash, config.initial_position);
    let mut default_book;
    let book: &mut dyn Book = match book {
        Some(book) => book,
        None => {
            default_book = LevelBook::new();
            &mut default_book
        }
    };

    let mut reader = match index_path {
        Some(index_path) => EvlogReader::open_with_index(evlog_path, index_path)?,
        None => EvlogReader::open(evlog_path)?,
    };

    let mut fills: Vec<Fill> = Vec::new();
    let mut equity_curve: Vec<(TsNs, QuoteAtoms)> = Vec::new();
    let mut action_id = 0u64;
    let mut fill_id = 0u64;
    let mut seen_ready_book = false;

    info!(evlog = %evlog_path.display(), "replay started");
    for batch in reader.iter_l2_batches() {
        let batch = batch?;
        book.apply_l2_batch(&batch)?;

        let (bid, ask) = book.best_bid_ask();
        let snapshot = match (bid, ask) {
            (Some((bid_px, bid_qty)), Some((ask_px, ask_qty))) => {
                ensure_snapshot_ready(bid_px, bid_qty, ask_px, ask_qty)?
            }
            _ => {
                if config.skip_initial_missing_book && !seen_ready_book {
                    continue;
                }
                return Err(BacktestError::schema("missing best bid/ask"));
            }
        };
        seen_ready_book = true;

        let ctx = StrategyContext {
            ts_recv_ns: batch.ts_recv_ns,
            cash: portfolio.cash,
            position: portfolio.position,
        };
        for action in strategy.on_batch(&ctx, &snapshot) {
            action_id += 1;
            let Action::MarketOrder { side, qty_lots } = action;
            if let Some(tape) = tape.as_deref_mut() {
                tape.record_action(batch.ts_recv_ns, action_id, side, qty_lots)?;
            }
            let fill = execute_market_order(
                batch.ts_recv_ns,
                side,
                qty_lots,
                &snapshot,
                &mut portfolio,
                fee_model,
                config,
            )?;
            let Some(fill) = fill else { continue };
            fill_id += 1;
            if let Some(tape) = tape.as_deref_mut() {
                tape.record_fill(
                    fill.ts_recv_ns,
                    fill_id,
                    action_id,
                    fill.side,
                    fill.price_ticks,
                    fill.qty_lots,
                    fill.notional,
                    fill.fee_atoms,
                )?;
            }
            fills.push(fill);
        }

        // Liquidation value: bid for long/flat, ask for short.
        let mark_px = if portfolio.position >= 0 {
            snapshot.bid_px
        } else {
            snapshot.ask_px
        };
        let equity = portfolio.equity(mark_px)?;
        equity_curve.push((batch.ts_recv_ns, equity));
        if let Some(tape) = tape.as_deref_mut() {
            tape.record_equity(batch.ts_recv_ns, portfolio.cash, portfolio.position, equity)?;
        }
    }
    debug!(
        batches = equity_curve.len(),
        fills = fills.len(),
        "replay loop complete"
    );

    let equity_values: Vec<QuoteAtoms> = equity_curve.iter().map(|&(_, e)| e).collect();
    let returns = returns_from_equity(&equity_values, config.initial_cash)?;
    let sharpe = sharpe_ratio(&returns)?;
    let psr = probabilistic_sharpe_ratio(&returns, config.sr_benchmark)?;
    let dsr = deflated_sharpe_ratio(&returns, config.sr_benchmark, config.dsr_trials)?;

    Ok(RunResult {
        fills,
        equity_curve,
        returns,
        sharpe,
        psr,
        dsr,
    })
}

fn ensure_snapshot_ready(
    bid_px: Ticks,
    bid_qty: Lots,
    ask_px: Ticks,
    ask_qty: Lots,
) -> Result<BookSnapshot, BacktestError> {
    if bid_qty <= 0 || ask_qty <= 0 {
        return Err(BacktestError::schema("non-positive top-of-book size"));
    }
    Ok(BookSnapshot {
        bid_px,
        bid_qty,
        ask_px,
        ask_qty,
    })
}

/// Execute one market order against the opposite top of book.
///
/// Returns `Ok(None)` only for a risk rejection under
/// `ignore_risk_rejects`.
fn execute_market_order(
    ts_recv_ns: TsNs,
    side: Side,
    qty_lots: Lots,
    book: &BookSnapshot,
    portfolio: &mut Portfolio,
    fee_model: &dyn FeeModel,
    config: &RunConfig,
) -> Result<Option<Fill>, BacktestError> {
    if qty_lots <= 0 {
        return Err(BacktestError::schema("qty_lots must be positive"));
    }
    let (price, available) = match side {
        Side::Bid => (book.ask_px, book.ask_qty),
        Side::Ask => (book.bid_px, book.bid_qty),
    };
    if qty_lots > available {
        return Err(BacktestError::schema(
            "market order exceeds top-of-book size",
        ));
    }
    let notional = price
        .checked_mul(qty_lots)
        .ok_or_else(|| BacktestError::schema("notional overflow"))?;
    let fee_atoms = fee_model.fee_atoms(notional)?;

    match side {
        Side::Bid => {
            if !config.allow_margin {
                let total = notional
                    .checked_add(fee_atoms)
                    .ok_or_else(|| BacktestError::schema("notional overflow"))?;
                if portfolio.cash < total {
                    if config.ignore_risk_rejects {
                        return Ok(None);
                    }
                    return Err(BacktestError::schema("insufficient cash for buy"));
                }
            }
        }
        Side::Ask => {
            if !config.allow_short && portfolio.position < qty_lots {
                if config.ignore_risk_rejects {
                    return Ok(None);
                }
                return Err(BacktestError::schema("insufficient position for sell"));
            }
        }
    }
    portfolio.apply_fill(
        side,
        price,
        qty_lots,
        fee_atoms,
        config.allow_short,
        config.allow_margin,
    )?;
    Ok(Some(Fill {
        ts_recv_ns,
        side,
        price_ticks: price,
        qty_lots,
        notional,
        fee_atoms,
    }))
}
