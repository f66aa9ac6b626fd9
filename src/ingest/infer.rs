//! Infer price/amount increments from vendor L2 CSV data.
//!
//! When no instrument metadata is available, the increments are inferred
//! from the first rows of the input: every observed value is scaled to a
//! common power of ten and folded into a running GCD. The result is the
//! largest decimal step that divides every observed value exactly.

use crate::core::decimal::parse_decimal;
use crate::core::error::BacktestError;
use crate::ingest::csv::{L2Row, L2RowReader};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Only the head of the data is sampled for inference.
const INFER_MAX_ROWS: usize = 1000;

#[derive(Debug, Default)]
struct IncrementStats {
    scale: u32,
    gcd_value: Option<i128>,
    first_value: Option<i128>,
    has_distinct: bool,
}

impl IncrementStats {
    fn add(&mut self, value: &Decimal, field: &str, allow_zero: bool) -> Result<(), BacktestError> {
        if value.is_zero() {
            if allow_zero {
                return Ok(());
            }
            return Err(BacktestError::schema(format!("{field} must be positive")));
        }
        if value.is_sign_negative() {
            return Err(BacktestError::schema(format!("{field} negative")));
        }
        let value = value.normalize();
        let exp = value.scale();
        if exp > self.scale {
            let factor = pow10(exp - self.scale)?;
            if let Some(gcd) = self.gcd_value.as_mut() {
                *gcd = gcd
                    .checked_mul(factor)
                    .ok_or_else(|| BacktestError::schema(format!("{field} out of range")))?;
            }
            if let Some(first) = self.first_value.as_mut() {
                *first = first
                    .checked_mul(factor)
                    .ok_or_else(|| BacktestError::schema(format!("{field} out of range")))?;
            }
            self.scale = exp;
        }
        let factor = pow10(self.scale - exp)?;
        let scaled = value
            .mantissa()
            .checked_mul(factor)
            .ok_or_else(|| BacktestError::schema(format!("{field} out of range")))?;
        match self.gcd_value {
            None => {
                self.gcd_value = Some(scaled);
                self.first_value = Some(scaled);
            }
            Some(gcd) => {
                if Some(scaled) != self.first_value {
                    self.has_distinct = true;
                }
                self.gcd_value = Some(gcd_i128(gcd, scaled));
            }
        }
        Ok(())
    }

    fn finish(self, field: &str) -> Result<Decimal, BacktestError> {
        let gcd = self
            .gcd_value
            .ok_or_else(|| BacktestError::schema(format!("{field} has no positive values")))?;
        if !self.has_distinct {
            return Err(BacktestError::schema(format!(
                "{field} has no distinct values to infer increment"
            )));
        }
        Ok(Decimal::from_i128_with_scale(gcd, self.scale).normalize())
    }
}

/// Infer `(price_increment, amount_increment)` from the head of the
/// given CSV files, as decimal strings.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] if no paths are given, a field
/// cannot be parsed, or a field never shows two distinct positive values
/// (a single value admits no unique increment).
pub fn infer_l2_increments(paths: &[PathBuf]) -> Result<(String, String), BacktestError> {
    if paths.is_empty() {
        return Err(BacktestError::schema("l2 paths must be non-empty"));
    }
    let mut price_stats = IncrementStats::default();
    let mut amount_stats = IncrementStats::default();
    let mut seen = 0usize;

    'outer: for path in paths {
        for row in L2RowReader::open(path)? {
            let row = row?;
            let price = parse_field(&row, &row.price, "price")?;
            let amount = parse_field(&row, &row.amount, "amount")?;
            price_stats.add(&price, "price", false)?;
            amount_stats.add(&amount, "amount", true)?;
            seen += 1;
            if seen >= INFER_MAX_ROWS {
                break 'outer;
            }
        }
    }

    let price_inc = price_stats.finish("price")?;
    let amount_inc = amount_stats.finish("amount")?;
    Ok((price_inc.to_string(), amount_inc.to_string()))
}

fn parse_field(row: &L2Row, value: &str, field: &str) -> Result<Decimal, BacktestError> {
    parse_decimal(value).map_err(|err| {
        BacktestError::schema(format!(
            "{field} invalid at line {} in {}: {}",
            row.line_number,
            row.source,
            err.detail()
        ))
    })
}

fn pow10(exp: u32) -> Result<i128, BacktestError> {
    10i128
        .checked_pow(exp)
        .ok_or_else(|| BacktestError::schema("scale out of range"))
}

fn gcd_i128(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
