//! Fixed-point quantization of decimal prices and sizes.
//!
//! A [`Quantizer`] converts vendor decimal strings into integer ticks and
//! lots. The conversion is exact by construction: both the value and the
//! increment are scaled to a common power of ten, and the scaled value
//! must be an integer multiple of the scaled increment. Anything lossy is
//! rejected with a quantization error at compile time, never rounded.

use crate::core::decimal::parse_decimal;
use crate::core::error::BacktestError;
use crate::core::hashing::{hash_json, hash_json_bytes};
use crate::core::types::{Lots, QuoteAtoms, Ticks};
use rust_decimal::Decimal;
use serde_json::{Value, json};

/// Converts decimal prices and amounts into integer ticks and lots.
///
/// Both increments are normalized (trailing fractional zeros stripped) at
/// construction, so equal increments always produce equal descriptors and
/// equal hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantizer {
    price_increment: Decimal,
    amount_increment: Decimal,
}

impl Quantizer {
    /// Create a quantizer from already-parsed increments.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Quantization`] if either increment is not
    /// strictly positive.
    pub fn new(price_increment: Decimal, amount_increment: Decimal) -> Result<Self, BacktestError> {
        Ok(Self {
            price_increment: normalize_increment(price_increment)?,
            amount_increment: normalize_increment(amount_increment)?,
        })
    }

    /// Create a quantizer from decimal strings.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Quantization`] if either string fails to
    /// parse or is not strictly positive.
    pub fn from_strs(price_increment: &str, amount_increment: &str) -> Result<Self, BacktestError> {
        Self::new(parse_decimal(price_increment)?, parse_decimal(amount_increment)?)
    }

    /// The normalized price increment.
    #[must_use]
    pub fn price_increment(&self) -> &Decimal {
        &self.price_increment
    }

    /// The normalized amount increment.
    #[must_use]
    pub fn amount_increment(&self) -> &Decimal {
        &self.amount_increment
    }

    /// Quantize a decimal price string into ticks.
    ///
    /// The price must be strictly positive and an exact multiple of the
    /// price increment.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Quantization`] on parse failure,
    /// non-positive input, or a non-multiple value.
    pub fn quantize_price(&self, value: &str) -> Result<Ticks, BacktestError> {
        let dec = parse_decimal(value)?;
        quantize(&dec, &self.price_increment, false, "price")
    }

    /// Quantize a decimal amount string into lots.
    ///
    /// Zero is permitted (delete semantics); negative amounts are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Quantization`] on parse failure, negative
    /// input, or a non-multiple value.
    pub fn quantize_amount(&self, value: &str) -> Result<Lots, BacktestError> {
        let dec = parse_decimal(value)?;
        quantize(&dec, &self.amount_increment, true, "amount")
    }

    /// Integer notional of a price/size pair.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Quantization`] if the product overflows.
    pub fn notional(&self, price_ticks: Ticks, amount_lots: Lots) -> Result<QuoteAtoms, BacktestError> {
        price_ticks
            .checked_mul(amount_lots)
            .ok_or_else(|| BacktestError::quantization("notional overflow"))
    }

    /// The canonical JSON descriptor of this quantizer.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        json!({
            "price_increment": self.price_increment.to_string(),
            "amount_increment": self.amount_increment.to_string(),
        })
    }

    /// SHA-256 of the canonical descriptor, lowercase hex.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        // The descriptor contains only strings, so canonicalization
        // cannot fail.
        hash_json(&self.descriptor()).unwrap_or_default()
    }

    /// SHA-256 of the canonical descriptor, raw 32 bytes. Embedded in the
    /// event-log header.
    #[must_use]
    pub fn hash_bytes(&self) -> [u8; 32] {
        hash_json_bytes(&self.descriptor()).unwrap_or_default()
    }
}

fn normalize_increment(increment: Decimal) -> Result<Decimal, BacktestError> {
    if increment <= Decimal::ZERO {
        return Err(BacktestError::quantization("increment must be positive"));
    }
    Ok(increment.normalize())
}

/// Scale `value` and `increment` to the increment's fractional precision
/// and divide. Fails unless the scaled value is integral and exactly
/// divisible.
fn quantize(
    value: &Decimal,
    increment: &Decimal,
    allow_zero: bool,
    field: &str,
) -> Result<i64, BacktestError> {
    if value.is_zero() {
        if allow_zero {
            return Ok(0);
        }
        return Err(BacktestError::quantization(format!(
            "{field} must be positive"
        )));
    }
    if value.is_sign_negative() {
        return Err(BacktestError::quantization(format!(
            "{field} must be non-negative"
        )));
    }

    let value = value.normalize();
    let scale = increment.scale();
    if value.scale() > scale {
        return Err(BacktestError::quantization(
            "value has more precision than increment",
        ));
    }

    let shift = scale - value.scale();
    let factor = 10i128
        .checked_pow(shift)
        .ok_or_else(|| BacktestError::quantization("value out of range"))?;
    let scaled_value = value
        .mantissa()
        .checked_mul(factor)
        .ok_or_else(|| BacktestError::quantization("value out of range"))?;
    let scaled_inc = increment.mantissa();
    if scaled_inc == 0 {
        return Err(BacktestError::quantization("increment underflow"));
    }
    if scaled_value % scaled_inc != 0 {
        return Err(BacktestError::quantization(format!(
            "{field} not a multiple of increment"
        )));
    }
    i64::try_from(scaled_value / scaled_inc)
        .map_err(|_| BacktestError::quantization(format!("{field} out of i64 range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_price_exact_multiples() {
        let q = Quantizer::from_strs("0.01", "0.001").unwrap();
        assert_eq!(q.quantize_price("10.05").unwrap(), 1005);
        assert_eq!(q.quantize_price("0.01").unwrap(), 1);
        assert_eq!(q.quantize_amount("0.005").unwrap(), 5);
    }

    #[test]
    fn test_quantize_rejects_non_multiples() {
        let q = Quantizer::from_strs("0.01", "1").unwrap();
        assert!(q.quantize_price("10.005").is_err());
        assert!(q.quantize_amount("0.5").is_err());
    }

    #[test]
    fn test_quantize_price_rejects_zero_and_negative() {
        let q = Quantizer::from_strs("1", "1").unwrap();
        assert!(q.quantize_price("0").is_err());
        assert!(q.quantize_price("-10").is_err());
    }

    #[test]
    fn test_quantize_amount_allows_zero() {
        let q = Quantizer::from_strs("1", "1").unwrap();
        assert_eq!(q.quantize_amount("0").unwrap(), 0);
        assert_eq!(q.quantize_amount("0.000").unwrap(), 0);
        assert!(q.quantize_amount("-1").is_err());
    }

    #[test]
    fn test_trailing_zeros_do_not_change_result() {
        let q = Quantizer::from_strs("0.010", "1").unwrap();
        assert_eq!(q.quantize_price("10.50").unwrap(), 1050);
        assert_eq!(q.quantize_price("10.5").unwrap(), 1050);
    }

    #[test]
    fn test_increment_must_be_positive() {
        assert!(Quantizer::from_strs("0", "1").is_err());
        assert!(Quantizer::from_strs("-0.01", "1").is_err());
        assert!(Quantizer::from_strs("1", "0").is_err());
    }

    #[test]
    fn test_notional_checked() {
        let q = Quantizer::from_strs("1", "1").unwrap();
        assert_eq!(q.notional(10, 3).unwrap(), 30);
        assert!(q.notional(i64::MAX, 2).is_err());
    }

    #[test]
    fn test_descriptor_is_normalized() {
        let a = Quantizer::from_strs("0.010", "1.0").unwrap();
        let b = Quantizer::from_strs("0.01", "1").unwrap();
        assert_eq!(a.descriptor(), b.descriptor());
        assert_eq!(a.hash_hex(), b.hash_hex());
        assert_eq!(a.hash_bytes(), b.hash_bytes());
    }

    #[test]
    fn test_hash_hex_matches_hash_bytes() {
        let q = Quantizer::from_strs("1", "1").unwrap();
        let hex: String = q.hash_bytes().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, q.hash_hex());
    }
}
