//! Per-step return series from an integer equity curve.

use crate::core::error::BacktestError;
use crate::core::types::{Bps, QuoteAtoms};

const BPS_SCALE: i128 = 10_000;

/// Round `numer / denom` to the nearest integer, ties to even.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for a non-positive denominator.
pub fn round_half_even(numer: i128, denom: i128) -> Result<i64, BacktestError> {
    if denom <= 0 {
        return Err(BacktestError::schema("denom must be positive"));
    }
    let (sign, numer) = if numer < 0 { (-1, -numer) } else { (1, numer) };
    let mut quotient = numer / denom;
    let remainder = numer % denom;
    let twice_remainder = remainder * 2;
    if twice_remainder > denom || (twice_remainder == denom && quotient % 2 == 1) {
        quotient += 1;
    }
    i64::try_from(sign * quotient)
        .map_err(|_| BacktestError::schema("rounded value out of i64 range"))
}

/// Per-step equity deltas in basis points of `initial_cash`, rounded
/// half-even.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for non-positive initial cash or
/// fewer than two equity points.
pub fn returns_from_equity(
    equity: &[QuoteAtoms],
    initial_cash: QuoteAtoms,
) -> Result<Vec<Bps>, BacktestError> {
    if initial_cash <= 0 {
        return Err(BacktestError::schema("initial_cash must be positive"));
    }
    if equity.len() < 2 {
        return Err(BacktestError::schema(
            "insufficient equity points for returns",
        ));
    }
    let mut returns = Vec::with_capacity(equity.len() - 1);
    for window in equity.windows(2) {
        let delta = i128::from(window[1]) - i128::from(window[0]);
        returns.push(round_half_even(delta * BPS_SCALE, i128::from(initial_cash))?);
    }
    Ok(returns)
}
