//! Replay and execution: the engine loop, the portfolio ledger, fee
//! models, and the JSON-lines tape.

pub mod engine;
pub mod fees;
pub mod portfolio;
pub mod replay;
pub mod tape;

pub use engine::{Fill, RunConfig, RunResult, run_backtest};
pub use fees::{FeeModel, FixedBpsFeeModel};
pub use portfolio::Portfolio;
pub use replay::{BestBidAskIter, TopOfBook, iter_best_bid_ask};
pub use tape::TapeWriter;
