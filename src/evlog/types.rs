//! Event log data structures.

use crate::core::types::{Lots, Side, Ticks, TsNs};

/// A single L2 price-level update.
///
/// `amount_lots == 0` deletes the level at `price_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Update {
    /// Book side the update applies to.
    pub side: Side,
    /// Price level in ticks, strictly positive.
    pub price_ticks: Ticks,
    /// New aggregate size in lots; zero removes the level.
    pub amount_lots: Lots,
    /// Whether the update was part of an initial book snapshot.
    pub is_snapshot: bool,
}

/// A maximal run of updates sharing one local-receive timestamp.
///
/// Updates keep source order; duplicates are preserved and apply
/// last-wins downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Batch {
    /// Local receive timestamp in nanoseconds.
    pub ts_recv_ns: TsNs,
    /// Exchange timestamp in nanoseconds (from the last contributing row).
    pub ts_exch_ns: TsNs,
    /// True iff this batch starts a snapshot after non-snapshot data; the
    /// book is cleared before the batch is applied.
    pub resets_book: bool,
    /// The updates in source order.
    pub updates: Vec<L2Update>,
}
