//! Portfolio ledger.
//!
//! Integer-only cash and position accounting. The ledger re-checks the
//! engine's risk constraints on every mutation, so a direct caller
//! cannot drive it into a state the engine would have rejected.

use crate::core::error::BacktestError;
use crate::core::types::{Lots, QuoteAtoms, Side, Ticks};

/// Mutable cash and position state for one replay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portfolio {
    /// Cash in quote atoms.
    pub cash: QuoteAtoms,
    /// Position in lots; negative when short.
    pub position: Lots,
}

impl Portfolio {
    /// Create a ledger with the configured initial balances.
    #[must_use]
    pub fn new(cash: QuoteAtoms, position: Lots) -> Self {
        Self { cash, position }
    }

    /// Apply one fill: buys pay `notional + fee` and add lots, sells
    /// receive `notional - fee` and remove lots.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for non-positive quantity or
    /// price, negative fee, a buy beyond cash without `allow_margin`, a
    /// sell beyond position without `allow_short`, or arithmetic
    /// overflow.
    pub fn apply_fill(
        &mut self,
        side: Side,
        price_ticks: Ticks,
        qty_lots: Lots,
        fee_atoms: QuoteAtoms,
        allow_short: bool,
        allow_margin: bool,
    ) -> Result<(), BacktestError> {
        if qty_lots <= 0 {
            return Err(BacktestError::schema("qty_lots must be positive"));
        }
        if price_ticks <= 0 {
            return Err(BacktestError::schema("price_ticks must be positive"));
        }
        if fee_atoms < 0 {
            return Err(BacktestError::schema("fee_atoms must be non-negative"));
        }
        let notional = price_ticks
            .checked_mul(qty_lots)
            .ok_or_else(|| BacktestError::schema("notional overflow"))?;

        match side {
            Side::Bid => {
                let total = notional
                    .checked_add(fee_atoms)
                    .ok_or_else(|| BacktestError::schema("notional overflow"))?;
                if !allow_margin && self.cash < total {
                    return Err(BacktestError::schema("insufficient cash for buy"));
                }
                self.cash = self
                    .cash
                    .checked_sub(total)
                    .ok_or_else(|| BacktestError::schema("cash overflow"))?;
                self.position = self
                    .position
                    .checked_add(qty_lots)
                    .ok_or_else(|| BacktestError::schema("position overflow"))?;
            }
            Side::Ask => {
                if !allow_short && self.position < qty_lots {
                    return Err(BacktestError::schema("insufficient position for sell"));
                }
                let proceeds = notional
                    .checked_sub(fee_atoms)
                    .ok_or_else(|| BacktestError::schema("notional overflow"))?;
                self.cash = self
                    .cash
                    .checked_add(proceeds)
                    .ok_or_else(|| BacktestError::schema("cash overflow"))?;
                self.position = self
                    .position
                    .checked_sub(qty_lots)
                    .ok_or_else(|| BacktestError::schema("position overflow"))?;
            }
        }
        Ok(())
    }

    /// Liquidation equity at a mark price: `cash + position * mark`.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for a non-positive mark price or
    /// arithmetic overflow.
    pub fn equity(&self, mark_price_ticks: Ticks) -> Result<QuoteAtoms, BacktestError> {
        if mark_price_ticks <= 0 {
            return Err(BacktestError::schema("mark_price_ticks must be positive"));
        }
        self.position
            .checked_mul(mark_price_ticks)
            .and_then(|value| self.cash.checked_add(value))
            .ok_or_else(|| BacktestError::schema("equity overflow"))
    }
}
