//! Strict decimal parsing for quantized fields.
//!
//! Prices and sizes arrive as decimal strings and must convert without any
//! loss of precision; a value the decimal type cannot represent exactly is
//! rejected rather than rounded.

use crate::core::error::BacktestError;
use rust_decimal::Decimal;

/// Parse a decimal string exactly.
///
/// Accepts plain (`"0.01"`) and scientific (`"1e-7"`) notation. The input
/// is trimmed first; empty strings are rejected. Parsing never rounds: a
/// value with more significant digits than [`Decimal`] can hold fails.
///
/// # Errors
///
/// Returns [`BacktestError::Quantization`] if the input is empty, not a
/// decimal, or not exactly representable.
pub fn parse_decimal(value: &str) -> Result<Decimal, BacktestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BacktestError::quantization("empty decimal"));
    }
    let parsed = if value.contains(['e', 'E']) {
        Decimal::from_scientific(value)
    } else {
        Decimal::from_str_exact(value)
    };
    parsed.map_err(|_| BacktestError::quantization(format!("invalid decimal: {value:?}")))
}
