//! Core domain types.
//!
//! All quantities in the pipeline are signed 64-bit integers with a
//! semantic alias: nanosecond timestamps, prices in ticks, sizes in lots,
//! cash in quote-currency atoms, and returns in basis points. Floats never
//! touch book or ledger state.

use crate::core::error::BacktestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds since the Unix epoch. Non-negative in all on-disk records.
pub type TsNs = i64;

/// A price expressed in integer ticks. Strictly positive on the book.
pub type Ticks = i64;

/// A size expressed in integer lots. Non-negative; zero means delete.
pub type Lots = i64;

/// Cash or notional in integer quote-currency atoms. May be negative.
pub type QuoteAtoms = i64;

/// A return expressed in 1/10,000 units of a reference quantity.
pub type Bps = i64;

/// The side of the book an update or order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side.
    Bid = 0,
    /// Sell side.
    Ask = 1,
}

impl Side {
    /// The lowercase wire name of this side (`"bid"` or `"ask"`).
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }

    /// The opposite side.
    #[must_use]
    #[inline]
    pub fn opposite(&self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a vendor side token (case-insensitive `bid` / `ask`).
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for any other token.
pub fn parse_side(value: &str) -> Result<Side, BacktestError> {
    match value.to_ascii_lowercase().as_str() {
        "bid" => Ok(Side::Bid),
        "ask" => Ok(Side::Ask),
        _ => Err(BacktestError::schema(format!("invalid side: {value:?}"))),
    }
}

/// Total-order key for events across streams.
///
/// Lexicographic over `(ts_recv_ns, stream_rank, seq_in_stream)`. The key
/// justifies the pipeline's ordering invariants; it is not persisted in
/// v1 on-disk records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderingKey {
    /// Local receive timestamp in nanoseconds.
    pub ts_recv_ns: TsNs,
    /// Rank of the originating stream.
    pub stream_rank: u32,
    /// Sequence number within the stream.
    pub seq_in_stream: u64,
}
