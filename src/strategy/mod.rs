//! Strategy interface.
//!
//! A strategy sees one [`BookSnapshot`] and one [`StrategyContext`] per
//! batch and answers with an ordered sequence of [`Action`]s. Strategies
//! must be pure functions of their declared inputs and whatever private
//! state they maintain; the engine never inspects that state.

pub mod reference;

use crate::core::types::{Lots, QuoteAtoms, Side, Ticks, TsNs};

pub use reference::{AlternatingMarketOrderStrategy, RandomMarketOrderStrategy};

/// Top-of-book state handed to a strategy, always complete and with
/// strictly positive sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Best bid price.
    pub bid_px: Ticks,
    /// Size at the best bid.
    pub bid_qty: Lots,
    /// Best ask price.
    pub ask_px: Ticks,
    /// Size at the best ask.
    pub ask_qty: Lots,
}

/// Ledger state handed to a strategy alongside the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyContext {
    /// Local receive timestamp of the current batch.
    pub ts_recv_ns: TsNs,
    /// Current cash in quote atoms.
    pub cash: QuoteAtoms,
    /// Current position in lots.
    pub position: Lots,
}

/// An action a strategy may emit.
///
/// `MarketOrder` is the only variant the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A marketable order against the opposite top of book.
    MarketOrder {
        /// Side of the order (bid buys, ask sells).
        side: Side,
        /// Quantity in lots, strictly positive.
        qty_lots: Lots,
    },
}

/// Per-batch strategy callback.
pub trait Strategy {
    /// Produce actions for the current batch, in submission order.
    fn on_batch(&mut self, ctx: &StrategyContext, book: &BookSnapshot) -> Vec<Action>;
}
