//! Minimal L2 replay helper.
//!
//! [`iter_best_bid_ask`] replays an event log through a fresh book and
//! lazily yields the top of book after each batch, without any strategy
//! or ledger attached. Useful for eyeballing compiled data.

use crate::book::{Book, LevelBook};
use crate::core::error::BacktestError;
use crate::core::types::{Lots, Ticks, TsNs};
use crate::evlog::reader::EvlogReader;
use std::path::Path;

/// Top of book after one batch: `(bid, ask)`, each `(price, size)`.
pub type TopOfBook = (Option<(Ticks, Lots)>, Option<(Ticks, Lots)>);

/// Lazy iterator yielding `(ts_recv_ns, top_of_book)` per batch.
#[derive(Debug)]
pub struct BestBidAskIter {
    reader: EvlogReader,
    book: LevelBook,
    done: bool,
}

impl Iterator for BestBidAskIter {
    type Item = Result<(TsNs, TopOfBook), BacktestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let batch = match self.reader.iter_l2_batches().next() {
            None => {
                self.done = true;
                return None;
            }
            Some(Err(err)) => {
                self.done = true;
                return Some(Err(err));
            }
            Some(Ok(batch)) => batch,
        };
        if let Err(err) = self.book.apply_l2_batch(&batch) {
            self.done = true;
            return Some(Err(err));
        }
        Some(Ok((batch.ts_recv_ns, self.book.best_bid_ask())))
    }
}

/// Replay an event log, yielding the best bid/ask after every batch.
///
/// # Errors
///
/// Returns any reader open/validation error; per-batch errors surface
/// through the iterator.
pub fn iter_best_bid_ask(
    evlog_path: &Path,
    index_path: Option<&Path>,
) -> Result<BestBidAskIter, BacktestError> {
    let reader = match index_path {
        Some(index_path) => EvlogReader::open_with_index(evlog_path, index_path)?,
        None => EvlogReader::open(evlog_path)?,
    };
    Ok(BestBidAskIter {
        reader,
        book: LevelBook::new(),
        done: false,
    })
}
