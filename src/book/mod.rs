//! Reference L2 order book.
//!
//! [`LevelBook`] keeps per-side `price → size` maps in lockstep with
//! ascending sorted price arrays, giving O(log n) level maintenance via
//! binary search and O(1) top-of-book reads. The [`Book`] trait is the
//! capability seam the engine depends on; alternative book
//! implementations plug in without engine changes.

use crate::core::error::BacktestError;
use crate::core::types::{Lots, Side, Ticks};
use crate::evlog::types::{L2Batch, L2Update};
use std::collections::HashMap;
use tracing::trace;

/// Capability set the replay engine requires of a book.
pub trait Book {
    /// Empty the book.
    fn reset(&mut self);

    /// Apply one batch of L2 updates.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for invalid updates or, when
    /// crossed-book rejection is active, a crossed book after the batch.
    fn apply_l2_batch(&mut self, batch: &L2Batch) -> Result<(), BacktestError>;

    /// Best bid and best ask as `(price, size)` pairs, either possibly
    /// absent.
    fn best_bid_ask(&self) -> (Option<(Ticks, Lots)>, Option<(Ticks, Lots)>);

    /// Price/size levels for one side, best-first (bids descending, asks
    /// ascending), truncated to `depth`.
    fn levels(&self, side: Side, depth: usize) -> (Vec<Ticks>, Vec<Lots>);
}

/// Correctness-first reference book.
///
/// `batch.resets_book` clears the full book before the batch applies;
/// otherwise updates only touch referenced levels, and an explicit
/// `amount == 0` removes that price level.
#[derive(Debug, Clone)]
pub struct LevelBook {
    reject_crossed: bool,
    bids: HashMap<Ticks, Lots>,
    asks: HashMap<Ticks, Lots>,
    bid_prices: Vec<Ticks>,
    ask_prices: Vec<Ticks>,
}

impl LevelBook {
    /// Create an empty book with crossed-book rejection enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reject_crossed(true)
    }

    /// Create an empty book, choosing whether a crossed book after a
    /// batch is an error.
    #[must_use]
    pub fn with_reject_crossed(reject_crossed: bool) -> Self {
        Self {
            reject_crossed,
            bids: HashMap::new(),
            asks: HashMap::new(),
            bid_prices: Vec::new(),
            ask_prices: Vec::new(),
        }
    }

    fn apply_update(&mut self, update: &L2Update) -> Result<(), BacktestError> {
        if update.price_ticks <= 0 {
            return Err(BacktestError::schema(format!(
                "non-positive price: {}",
                update.price_ticks
            )));
        }
        if update.amount_lots < 0 {
            return Err(BacktestError::schema(format!(
                "negative amount: {}",
                update.amount_lots
            )));
        }
        let (levels, prices) = match update.side {
            Side::Bid => (&mut self.bids, &mut self.bid_prices),
            Side::Ask => (&mut self.asks, &mut self.ask_prices),
        };
        apply_level(levels, prices, update.price_ticks, update.amount_lots);
        Ok(())
    }

    fn check_crossed(&self) -> Result<(), BacktestError> {
        if self.bid_prices.is_empty() || self.ask_prices.is_empty() {
            return Ok(());
        }
        let best_bid = self.bid_prices[self.bid_prices.len() - 1];
        let best_ask = self.ask_prices[0];
        if best_bid >= best_ask {
            return Err(BacktestError::schema("crossed book"));
        }
        Ok(())
    }
}

impl Default for LevelBook {
    fn default() -> Self {
        Self::new()
    }
}

impl Book for LevelBook {
    fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.bid_prices.clear();
        self.ask_prices.clear();
    }

    fn apply_l2_batch(&mut self, batch: &L2Batch) -> Result<(), BacktestError> {
        if batch.resets_book {
            self.reset();
        }
        for update in &batch.updates {
            self.apply_update(update)?;
        }
        if self.reject_crossed {
            self.check_crossed()?;
        }
        trace!(
            ts_recv_ns = batch.ts_recv_ns,
            bids = self.bid_prices.len(),
            asks = self.ask_prices.len(),
            "applied l2 batch"
        );
        Ok(())
    }

    fn best_bid_ask(&self) -> (Option<(Ticks, Lots)>, Option<(Ticks, Lots)>) {
        let bid = self.bid_prices.last().map(|&price| {
            (price, self.bids.get(&price).copied().unwrap_or_default())
        });
        let ask = self.ask_prices.first().map(|&price| {
            (price, self.asks.get(&price).copied().unwrap_or_default())
        });
        (bid, ask)
    }

    fn levels(&self, side: Side, depth: usize) -> (Vec<Ticks>, Vec<Lots>) {
        if depth == 0 {
            return (Vec::new(), Vec::new());
        }
        let (levels, prices): (&HashMap<Ticks, Lots>, Box<dyn Iterator<Item = &Ticks> + '_>) =
            match side {
                Side::Bid => (&self.bids, Box::new(self.bid_prices.iter().rev())),
                Side::Ask => (&self.asks, Box::new(self.ask_prices.iter())),
            };
        let mut out_prices = Vec::new();
        let mut out_sizes = Vec::new();
        for &price in prices.take(depth) {
            out_prices.push(price);
            out_sizes.push(levels.get(&price).copied().unwrap_or_default());
        }
        (out_prices, out_sizes)
    }
}

/// Insert-or-replace a level; zero amount removes it. The sorted price
/// array and the map stay in lockstep.
fn apply_level(levels: &mut HashMap<Ticks, Lots>, prices: &mut Vec<Ticks>, price: Ticks, amount: Lots) {
    if amount == 0 {
        if levels.remove(&price).is_some() {
            if let Ok(idx) = prices.binary_search(&price) {
                prices.remove(idx);
            }
        }
        return;
    }
    if levels.insert(price, amount).is_none() {
        if let Err(idx) = prices.binary_search(&price) {
            prices.insert(idx, price);
        }
    }
}
