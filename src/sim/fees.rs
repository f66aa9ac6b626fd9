//! Fee models.

use crate::core::error::BacktestError;
use crate::core::types::QuoteAtoms;
use serde::{Deserialize, Serialize};

/// Capability the engine requires of a fee schedule.
pub trait FeeModel {
    /// Fee in quote atoms for a given non-negative notional.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for a negative notional.
    fn fee_atoms(&self, notional: QuoteAtoms) -> Result<QuoteAtoms, BacktestError>;
}

/// Flat taker fee in basis points of notional, floored to whole atoms.
///
/// `fee = notional * bps / 10_000` with integer floor division, so a
/// 10 bps fee on a 1050-atom notional is exactly 1 atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedBpsFeeModel {
    bps: i64,
}

impl FixedBpsFeeModel {
    /// Create a fee model with `bps` in `[0, 10_000]`.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] for a rate outside that range.
    pub fn new(bps: i64) -> Result<Self, BacktestError> {
        if bps < 0 {
            return Err(BacktestError::schema("fee bps must be non-negative"));
        }
        if bps > 10_000 {
            return Err(BacktestError::schema("fee bps too large"));
        }
        Ok(Self { bps })
    }

    /// The configured rate in basis points.
    #[must_use]
    pub fn bps(&self) -> i64 {
        self.bps
    }
}

impl FeeModel for FixedBpsFeeModel {
    #[inline]
    fn fee_atoms(&self, notional: QuoteAtoms) -> Result<QuoteAtoms, BacktestError> {
        if notional < 0 {
            return Err(BacktestError::schema("notional must be non-negative"));
        }
        let fee = i128::from(notional) * i128::from(self.bps) / 10_000;
        i64::try_from(fee).map_err(|_| BacktestError::schema("fee out of i64 range"))
    }
}
