use l2_backtest::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

const HEADER: &str = "exchange,symbol,timestamp,local_timestamp,is_snapshot,side,price,amount";

fn write_l2(dir: &Path, rows: &[[&str; 8]]) -> PathBuf {
    let path = dir.join("l2.csv");
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(&row.join(","));
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn compile(dir: &Path, rows: &[[&str; 8]]) -> CompileResult {
    let path = write_l2(dir, rows);
    let options = CompileOptions::new(
        vec![path],
        dir.join("out"),
        Quantizer::from_strs("1", "1").unwrap(),
    );
    compile_l2_csv(&options).unwrap()
}

/// Four batches with 5-lot levels: prices walk so an alternating 1-lot
/// strategy produces the reference return series (0, -10, 0).
fn deep_book_rows() -> Vec<[&'static str; 8]> {
    vec![
        ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "5"],
        ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "5"],
        ["binance", "BTCUSDT", "910", "2000", "false", "bid", "10", "5"],
        ["binance", "BTCUSDT", "912", "2000", "false", "ask", "11", "0"],
        ["binance", "BTCUSDT", "915", "2000", "false", "ask", "12", "5"],
        ["binance", "BTCUSDT", "920", "3000", "false", "bid", "10", "0"],
        ["binance", "BTCUSDT", "922", "3000", "false", "bid", "11", "5"],
        ["binance", "BTCUSDT", "925", "3000", "false", "ask", "12", "5"],
        ["binance", "BTCUSDT", "930", "4000", "false", "bid", "11", "5"],
        ["binance", "BTCUSDT", "932", "4000", "false", "ask", "12", "0"],
        ["binance", "BTCUSDT", "935", "4000", "false", "ask", "13", "5"],
    ]
}

fn config_1000() -> RunConfig {
    RunConfig {
        initial_cash: 1000,
        initial_position: 0,
        allow_short: false,
        allow_margin: false,
        sr_benchmark: 0.0,
        dsr_trials: 10,
        skip_initial_missing_book: false,
        ignore_risk_rejects: false,
    }
}

#[test]
fn test_alternating_market_order_backtest() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());

    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let result = run_backtest(
        &compiled.evlog_path,
        Some(&compiled.index_path),
        &mut strategy,
        &fees,
        &config_1000(),
        None,
        None,
    )
    .unwrap();

    assert_eq!(result.fills.len(), 4);
    assert_eq!(result.equity_curve.len(), 4);
    assert_eq!(result.returns, vec![0, -10, 0]);
    let expected_sharpe = sharpe_ratio(&[0, -10, 0]).unwrap();
    assert!((result.sharpe - expected_sharpe).abs() < 1e-12);
    assert!((0.0..=1.0).contains(&result.psr));
    assert!((0.0..=1.0).contains(&result.dsr));

    // Fill sides alternate starting with a buy at the ask.
    assert_eq!(result.fills[0].side, Side::Bid);
    assert_eq!(result.fills[0].price_ticks, 11);
    assert_eq!(result.fills[1].side, Side::Ask);
    assert_eq!(result.fills[1].price_ticks, 10);
}

#[test]
fn test_market_order_exceeds_top_of_book() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(
        dir.path(),
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "1"],
        ],
    );
    let mut strategy = AlternatingMarketOrderStrategy::new(2).unwrap();
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let err = run_backtest(
        &compiled.evlog_path,
        Some(&compiled.index_path),
        &mut strategy,
        &fees,
        &config_1000(),
        None,
        None,
    )
    .unwrap_err();
    assert!(format!("{err}").contains("exceeds top-of-book"));
}

struct SellOnly;

impl Strategy for SellOnly {
    fn on_batch(&mut self, _ctx: &StrategyContext, _book: &BookSnapshot) -> Vec<Action> {
        vec![Action::MarketOrder {
            side: Side::Ask,
            qty_lots: 1,
        }]
    }
}

#[test]
fn test_short_sell_disallowed() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(
        dir.path(),
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "1"],
        ],
    );
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let err = run_backtest(
        &compiled.evlog_path,
        Some(&compiled.index_path),
        &mut SellOnly,
        &fees,
        &config_1000(),
        None,
        None,
    )
    .unwrap_err();
    assert_eq!(format!("{err}"), "schema error: insufficient position for sell");
}

#[test]
fn test_initial_short_position_disallowed() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut config = config_1000();
    config.initial_position = -1;
    assert!(
        run_backtest(
            &compiled.evlog_path,
            None,
            &mut strategy,
            &fees,
            &config,
            None,
            None,
        )
        .is_err()
    );
}

struct BuyOnly {
    qty_lots: i64,
}

impl Strategy for BuyOnly {
    fn on_batch(&mut self, _ctx: &StrategyContext, _book: &BookSnapshot) -> Vec<Action> {
        vec![Action::MarketOrder {
            side: Side::Bid,
            qty_lots: self.qty_lots,
        }]
    }
}

#[test]
fn test_ignore_risk_rejects_skips_silently() {
    // A 5-lot buy at 11 costs 55 of the 60 starting atoms; every later
    // buy fails the cash check and is skipped, while the held position
    // still marks against the moving bid.
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut config = config_1000();
    config.initial_cash = 60;
    config.ignore_risk_rejects = true;

    let result = run_backtest(
        &compiled.evlog_path,
        Some(&compiled.index_path),
        &mut BuyOnly { qty_lots: 5 },
        &fees,
        &config,
        None,
        None,
    )
    .unwrap();
    assert_eq!(result.fills.len(), 1);
    assert_eq!(result.equity_curve.len(), 4);
    let equities: Vec<i64> = result.equity_curve.iter().map(|&(_, e)| e).collect();
    assert_eq!(equities, vec![55, 55, 60, 60]);
    assert_eq!(result.returns, vec![0, 833, 0]);
}

#[test]
fn test_skip_initial_missing_book() {
    // The first batch only carries a bid; with the flag the engine waits
    // for the first complete top of book instead of failing.
    let dir = tempfile::tempdir().unwrap();
    let mut rows = vec![[
        "binance", "BTCUSDT", "800", "500", "true", "bid", "10", "5",
    ]];
    rows.extend(deep_book_rows());
    let compiled = compile(dir.path(), &rows);

    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let err = run_backtest(
        &compiled.evlog_path,
        None,
        &mut strategy,
        &fees,
        &config_1000(),
        None,
        None,
    )
    .unwrap_err();
    assert_eq!(format!("{err}"), "schema error: missing best bid/ask");

    let mut config = config_1000();
    config.skip_initial_missing_book = true;
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let result = run_backtest(
        &compiled.evlog_path,
        None,
        &mut strategy,
        &fees,
        &config,
        None,
        None,
    )
    .unwrap();
    assert_eq!(result.equity_curve.len(), 4);
    assert_eq!(result.returns, vec![0, -10, 0]);
}

#[test]
fn test_fees_flow_into_fills_and_equity() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    // A realistic 10 bps fee floors to 0 on an 11-atom notional, so use
    // a 1000 bps rate to make the fee visible at these prices.
    let fees = FixedBpsFeeModel::new(1000).unwrap();
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let result = run_backtest(
        &compiled.evlog_path,
        None,
        &mut strategy,
        &fees,
        &config_1000(),
        None,
        None,
    )
    .unwrap();
    // Buy at 11: fee = floor(11 * 1000 / 10000) = 1.
    assert_eq!(result.fills[0].fee_atoms, 1);
    assert_eq!(result.fills[0].notional, 11);
    // Equity after batch 1: 1000 - 11 - 1 + 10 = 998.
    assert_eq!(result.equity_curve[0].1, 998);
}

#[test]
fn test_tape_traces_actions_fills_and_equity() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();

    let tape_path = dir.path().join("run.tape");
    let meta: serde_json::Map<String, Value> =
        [("symbol".to_string(), Value::String("BTCUSDT".to_string()))]
            .into_iter()
            .collect();
    let mut tape = TapeWriter::create(&tape_path, Some(&meta)).unwrap();
    run_backtest(
        &compiled.evlog_path,
        Some(&compiled.index_path),
        &mut strategy,
        &fees,
        &config_1000(),
        None,
        Some(&mut tape),
    )
    .unwrap();
    tape.finish().unwrap();

    let content = std::fs::read_to_string(&tape_path).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    // Header + 4 batches x (action + fill + equity).
    assert_eq!(lines.len(), 13);
    assert_eq!(lines[0]["type"], "header");
    assert_eq!(lines[0]["symbol"], "BTCUSDT");
    assert_eq!(lines[1]["type"], "action");
    assert_eq!(lines[1]["side"], "bid");
    assert_eq!(lines[2]["type"], "fill");
    assert_eq!(lines[2]["fill_id"], 1);
    assert_eq!(lines[2]["action_id"], 1);
    assert_eq!(lines[3]["type"], "equity");
    assert_eq!(lines[3]["equity"], 999);

    // Action identifiers increase monotonically across batches.
    let action_ids: Vec<u64> = lines
        .iter()
        .filter(|l| l["type"] == "action")
        .map(|l| l["action_id"].as_u64().unwrap())
        .collect();
    assert_eq!(action_ids, vec![1, 2, 3, 4]);
}

#[test]
fn test_seeded_random_strategy_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut config = config_1000();
    config.allow_short = true;
    config.allow_margin = true;

    let run = |seed: u64| {
        let mut strategy = RandomMarketOrderStrategy::new(seed, 50, 1, 2).unwrap();
        run_backtest(
            &compiled.evlog_path,
            None,
            &mut strategy,
            &fees,
            &config,
            None,
            None,
        )
    };

    let first = run(7);
    let second = run(7);
    match (first, second) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a.fills, b.fills);
            assert_eq!(a.equity_curve, b.equity_curve);
            assert_eq!(a.returns, b.returns);
        }
        (Err(a), Err(b)) => assert_eq!(format!("{a}"), format!("{b}")),
        _ => panic!("seeded runs diverged"),
    }
}

#[test]
fn test_custom_book_via_trait_object() {
    // The engine accepts any Book implementation through the trait seam.
    let dir = tempfile::tempdir().unwrap();
    let compiled = compile(dir.path(), &deep_book_rows());
    let fees = FixedBpsFeeModel::new(0).unwrap();
    let mut strategy = AlternatingMarketOrderStrategy::new(1).unwrap();
    let mut book = LevelBook::new();
    let result = run_backtest(
        &compiled.evlog_path,
        None,
        &mut strategy,
        &fees,
        &config_1000(),
        Some(&mut book),
        None,
    )
    .unwrap();
    assert_eq!(result.fills.len(), 4);
    // The caller-owned book holds the final state.
    let (bid, ask) = book.best_bid_ask();
    assert_eq!(bid, Some((11, 5)));
    assert_eq!(ask, Some((13, 5)));
}
