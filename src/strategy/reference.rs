//! Reference strategies for smoke testing and determinism checks.

use crate::core::error::BacktestError;
use crate::core::types::{Lots, Side};
use crate::strategy::{Action, BookSnapshot, Strategy, StrategyContext};
use rand::SeedableRng;
use rand::RngCore;
use rand_chacha::ChaCha8Rng;

/// Emits one market order per batch, alternating sides starting with
/// the bid.
#[derive(Debug, Clone)]
pub struct AlternatingMarketOrderStrategy {
    qty_lots: Lots,
    next_side: Side,
}

impl AlternatingMarketOrderStrategy {
    /// Create the strategy with a fixed per-order quantity.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for a non-positive quantity.
    pub fn new(qty_lots: Lots) -> Result<Self, BacktestError> {
        if qty_lots <= 0 {
            return Err(BacktestError::schema("qty_lots must be positive"));
        }
        Ok(Self {
            qty_lots,
            next_side: Side::Bid,
        })
    }
}

impl Strategy for AlternatingMarketOrderStrategy {
    fn on_batch(&mut self, _ctx: &StrategyContext, _book: &BookSnapshot) -> Vec<Action> {
        let action = Action::MarketOrder {
            side: self.next_side,
            qty_lots: self.qty_lots,
        };
        self.next_side = self.next_side.opposite();
        vec![action]
    }
}

/// Deterministic per-batch random market orders.
///
/// The PRNG is pinned to ChaCha8 seeded with `seed_from_u64`, and every
/// draw is taken as `next_u32() % n`, so the emitted order stream is
/// identical across platforms and runs for a given seed.
#[derive(Debug, Clone)]
pub struct RandomMarketOrderStrategy {
    rng: ChaCha8Rng,
    order_pct: u32,
    min_qty: Lots,
    max_qty: Lots,
}

impl RandomMarketOrderStrategy {
    /// Create the strategy.
    ///
    /// `order_pct` is the percentage of batches that emit an order;
    /// quantities are drawn uniformly from `[min_qty, max_qty]`.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for `order_pct > 100`, a
    /// non-positive minimum, or an inverted quantity range.
    pub fn new(
        seed: u64,
        order_pct: u32,
        min_qty_lots: Lots,
        max_qty_lots: Lots,
    ) -> Result<Self, BacktestError> {
        if order_pct > 100 {
            return Err(BacktestError::schema("order_pct must be in [0, 100]"));
        }
        if min_qty_lots <= 0 {
            return Err(BacktestError::schema("min_qty_lots must be positive"));
        }
        if max_qty_lots < min_qty_lots {
            return Err(BacktestError::schema(
                "max_qty_lots must be >= min_qty_lots",
            ));
        }
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            order_pct,
            min_qty: min_qty_lots,
            max_qty: max_qty_lots,
        })
    }

    fn draw(&mut self, n: u64) -> u64 {
        u64::from(self.rng.next_u32()) % n
    }
}

impl Strategy for RandomMarketOrderStrategy {
    fn on_batch(&mut self, _ctx: &StrategyContext, _book: &BookSnapshot) -> Vec<Action> {
        if self.order_pct == 0 {
            return Vec::new();
        }
        if self.order_pct < 100 && self.draw(100) >= u64::from(self.order_pct) {
            return Vec::new();
        }
        let side = if self.draw(2) == 0 { Side::Bid } else { Side::Ask };
        let qty = if self.min_qty == self.max_qty {
            self.min_qty
        } else {
            let span = (self.max_qty - self.min_qty + 1) as u64;
            self.min_qty + self.draw(span) as i64
        };
        vec![Action::MarketOrder {
            side,
            qty_lots: qty,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BookSnapshot {
        BookSnapshot {
            bid_px: 10,
            bid_qty: 5,
            ask_px: 11,
            ask_qty: 5,
        }
    }

    fn ctx(ts: i64) -> StrategyContext {
        StrategyContext {
            ts_recv_ns: ts,
            cash: 1000,
            position: 0,
        }
    }

    #[test]
    fn test_alternating_starts_with_bid() {
        let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
        let sides: Vec<Side> = (0..4)
            .flat_map(|i| strategy.on_batch(&ctx(i), &snapshot()))
            .map(|action| match action {
                Action::MarketOrder { side, .. } => side,
            })
            .collect();
        assert_eq!(sides, vec![Side::Bid, Side::Ask, Side::Bid, Side::Ask]);
    }

    #[test]
    fn test_alternating_rejects_non_positive_qty() {
        assert!(AlternatingMarketOrderStrategy::new(0).is_err());
        assert!(AlternatingMarketOrderStrategy::new(-1).is_err());
    }

    #[test]
    fn test_random_is_deterministic_for_a_seed() {
        let mut a = RandomMarketOrderStrategy::new(42, 50, 1, 3).unwrap();
        let mut b = RandomMarketOrderStrategy::new(42, 50, 1, 3).unwrap();
        for i in 0..64 {
            assert_eq!(a.on_batch(&ctx(i), &snapshot()), b.on_batch(&ctx(i), &snapshot()));
        }
    }

    #[test]
    fn test_random_seed_changes_stream() {
        let mut a = RandomMarketOrderStrategy::new(1, 100, 1, 100).unwrap();
        let mut b = RandomMarketOrderStrategy::new(2, 100, 1, 100).unwrap();
        let stream_a: Vec<_> = (0..32).flat_map(|i| a.on_batch(&ctx(i), &snapshot())).collect();
        let stream_b: Vec<_> = (0..32).flat_map(|i| b.on_batch(&ctx(i), &snapshot())).collect();
        assert_ne!(stream_a, stream_b);
    }

    #[test]
    fn test_random_zero_pct_never_orders() {
        let mut strategy = RandomMarketOrderStrategy::new(7, 0, 1, 1).unwrap();
        for i in 0..32 {
            assert!(strategy.on_batch(&ctx(i), &snapshot()).is_empty());
        }
    }

    #[test]
    fn test_random_full_pct_always_orders_in_range() {
        let mut strategy = RandomMarketOrderStrategy::new(7, 100, 2, 4).unwrap();
        for i in 0..64 {
            let actions = strategy.on_batch(&ctx(i), &snapshot());
            assert_eq!(actions.len(), 1);
            let Action::MarketOrder { qty_lots, .. } = actions[0];
            assert!((2..=4).contains(&qty_lots));
        }
    }

    #[test]
    fn test_random_validation() {
        assert!(RandomMarketOrderStrategy::new(0, 101, 1, 1).is_err());
        assert!(RandomMarketOrderStrategy::new(0, 50, 0, 1).is_err());
        assert!(RandomMarketOrderStrategy::new(0, 50, 3, 2).is_err());
    }
}
