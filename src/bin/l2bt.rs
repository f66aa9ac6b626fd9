//! Command-line front end: compile vendor CSV into an event log and run
//! backtests over compiled logs.

use clap::{Parser, Subcommand};
use l2_backtest::prelude::*;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "l2bt", about = "Deterministic L2 market-data backtester")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile L2 CSV(.gz) inputs into an event log, index, and manifest.
    Compile(CompileArgs),
    /// Replay a compiled event log through a strategy.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Input CSV path(s); repeatable.
    #[arg(long = "l2", value_name = "PATH")]
    l2: Vec<PathBuf>,

    /// Data root to locate inputs under (instead of --l2).
    #[arg(long, value_name = "DIR", conflicts_with = "l2")]
    data_root: Option<PathBuf>,

    /// Exchange name (required with --data-root).
    #[arg(long)]
    exchange: Option<String>,

    /// Symbol (required with --data-root).
    #[arg(long)]
    symbol: Option<String>,

    /// Date YYYY-MM-DD (required with --data-root).
    #[arg(long)]
    date: Option<String>,

    /// Vendor data type under the data root.
    #[arg(long, default_value = "incremental_book_L2")]
    data_type: String,

    /// Output directory.
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    /// Price increment as a decimal string; inferred when omitted.
    #[arg(long, requires = "amount_increment")]
    price_increment: Option<String>,

    /// Amount increment as a decimal string; inferred when omitted.
    #[arg(long, requires = "price_increment")]
    amount_increment: Option<String>,

    /// Failure policy: hard_fail or quarantine.
    #[arg(long, default_value = "hard_fail")]
    failure_policy: String,

    /// Post-quarantine behavior: halt, skip_row, or skip_batch.
    #[arg(long, default_value = "halt")]
    quarantine_action: String,

    /// Quarantine JSONL output path.
    #[arg(long, value_name = "PATH")]
    quarantine_out: Option<PathBuf>,

    /// Output base-name prefix (required for multiple inputs).
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Compiled event log path.
    #[arg(long, value_name = "PATH")]
    evlog: PathBuf,

    /// Time index path.
    #[arg(long, value_name = "PATH")]
    index: Option<PathBuf>,

    /// Strategy: alternating or random.
    #[arg(long, default_value = "alternating")]
    strategy: String,

    /// Order quantity in lots (alternating strategy).
    #[arg(long, default_value_t = 1)]
    qty: i64,

    /// RNG seed (random strategy).
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Percentage of batches that emit an order (random strategy).
    #[arg(long, default_value_t = 100)]
    order_pct: u32,

    /// Minimum order quantity in lots (random strategy).
    #[arg(long, default_value_t = 1)]
    min_qty: i64,

    /// Maximum order quantity in lots (random strategy).
    #[arg(long, default_value_t = 1)]
    max_qty: i64,

    /// Initial cash in quote atoms.
    #[arg(long, default_value_t = 1_000_000)]
    initial_cash: i64,

    /// Initial position in lots.
    #[arg(long, default_value_t = 0)]
    initial_position: i64,

    /// Allow selling beyond the position.
    #[arg(long)]
    allow_short: bool,

    /// Allow buying beyond the cash.
    #[arg(long)]
    allow_margin: bool,

    /// Taker fee in basis points.
    #[arg(long, default_value_t = 0)]
    fee_bps: i64,

    /// Sharpe benchmark for PSR/DSR.
    #[arg(long, default_value_t = 0.0)]
    sr_benchmark: f64,

    /// Trial count for DSR deflation.
    #[arg(long, default_value_t = 1)]
    dsr_trials: u32,

    /// Tolerate an incomplete book before the first complete one.
    #[arg(long)]
    skip_initial_missing_book: bool,

    /// Skip orders failing cash/position checks instead of failing.
    #[arg(long)]
    ignore_risk_rejects: bool,

    /// JSON-lines tape output path.
    #[arg(long, value_name = "PATH")]
    tape: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Compile(args) => compile(&args),
        Command::Run(args) => run(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn compile(args: &CompileArgs) -> Result<(), BacktestError> {
    let (inputs, prefix) = resolve_inputs(args)?;
    let quantizer = resolve_quantizer(args, &inputs)?;

    let mut options = CompileOptions::new(inputs, args.out.clone(), quantizer);
    options.failure_policy = args.failure_policy.parse()?;
    options.quarantine_action = args.quarantine_action.parse()?;
    options.quarantine_path = args.quarantine_out.clone();
    options.output_prefix = prefix;

    let result = compile_l2_csv(&options)?;
    println!(
        "evlog={} index={} manifest={} records={}",
        result.evlog_path.display(),
        result.index_path.display(),
        result.manifest_path.display(),
        result.record_count,
    );
    Ok(())
}

fn resolve_inputs(args: &CompileArgs) -> Result<(Vec<PathBuf>, Option<String>), BacktestError> {
    if let Some(root) = &args.data_root {
        let (exchange, symbol, date) = match (&args.exchange, &args.symbol, &args.date) {
            (Some(exchange), Some(symbol), Some(date)) => (exchange, symbol, date),
            _ => {
                return Err(BacktestError::schema(
                    "exchange/symbol/date required with --data-root",
                ));
            }
        };
        let locator = DataLocator::new(root.clone());
        let inputs = locator.find(exchange, &args.data_type, date, symbol)?;
        let safe = |value: &str| value.replace('/', "_");
        let prefix = format!(
            "{}-{}-{date}-{}",
            safe(exchange),
            safe(symbol),
            safe(&args.data_type)
        );
        return Ok((inputs, Some(prefix)));
    }
    if args.l2.is_empty() {
        return Err(BacktestError::schema("--l2 or --data-root required"));
    }
    Ok((args.l2.clone(), args.prefix.clone()))
}

fn resolve_quantizer(
    args: &CompileArgs,
    inputs: &[PathBuf],
) -> Result<Quantizer, BacktestError> {
    match (&args.price_increment, &args.amount_increment) {
        (Some(price), Some(amount)) => Quantizer::from_strs(price, amount),
        _ => {
            let (price, amount) = infer_l2_increments(inputs)?;
            Quantizer::from_strs(&price, &amount)
        }
    }
}

fn run(args: &RunArgs) -> Result<(), BacktestError> {
    let config = RunConfig {
        initial_cash: args.initial_cash,
        initial_position: args.initial_position,
        allow_short: args.allow_short,
        allow_margin: args.allow_margin,
        sr_benchmark: args.sr_benchmark,
        dsr_trials: args.dsr_trials,
        skip_initial_missing_book: args.skip_initial_missing_book,
        ignore_risk_rejects: args.ignore_risk_rejects,
    };

    let mut alternating;
    let mut random;
    let strategy: &mut dyn Strategy = match args.strategy.as_str() {
        "alternating" => {
            alternating = AlternatingMarketOrderStrategy::new(args.qty)?;
            &mut alternating
        }
        "random" => {
            random = RandomMarketOrderStrategy::new(
                args.seed,
                args.order_pct,
                args.min_qty,
                args.max_qty,
            )?;
            &mut random
        }
        other => {
            return Err(BacktestError::schema(format!(
                "unknown strategy: {other:?}"
            )));
        }
    };
    let fees = FixedBpsFeeModel::new(args.fee_bps)?;

    let mut tape = match &args.tape {
        Some(path) => {
            let meta: Map<String, Value> = [
                ("evlog".to_string(), json!(args.evlog.to_string_lossy())),
                ("strategy".to_string(), json!(args.strategy)),
                ("initial_cash".to_string(), json!(args.initial_cash)),
                ("fee_bps".to_string(), json!(args.fee_bps)),
            ]
            .into_iter()
            .collect();
            Some(TapeWriter::create(path, Some(&meta))?)
        }
        None => None,
    };

    let result = run_backtest(
        &args.evlog,
        args.index.as_deref(),
        strategy,
        &fees,
        &config,
        None,
        tape.as_mut(),
    )?;
    if let Some(tape) = tape {
        tape.finish()?;
    }

    let final_equity = result.equity_curve.last().map(|&(_, e)| e).unwrap_or(0);
    println!(
        "batches={} fills={} final_equity={} sharpe={:.6} psr={:.6} dsr={:.6}",
        result.equity_curve.len(),
        result.fills.len(),
        final_equity,
        result.sharpe,
        result.psr,
        result.dsr,
    );
    Ok(())
}
