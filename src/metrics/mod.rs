//! Performance metrics over integer equity curves.

pub mod returns;
pub mod sharpe;

pub use returns::{returns_from_equity, round_half_even};
pub use sharpe::{deflated_sharpe_ratio, probabilistic_sharpe_ratio, sharpe_ratio};
