use l2_backtest::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

const HEADER: &str = "exchange,symbol,timestamp,local_timestamp,is_snapshot,side,price,amount";

fn write_l2(dir: &Path, name: &str, rows: &[[&str; 8]]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(&row.join(","));
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn options(inputs: Vec<PathBuf>, out: &Path) -> CompileOptions {
    CompileOptions::new(
        inputs,
        out.to_path_buf(),
        Quantizer::from_strs("1", "1").unwrap(),
    )
}

#[test]
fn test_compile_snapshot_and_delete() {
    // Two batches; the second deletes the bid and inserts a deeper ask.
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
            ["binance", "BTCUSDT", "910", "2000", "false", "bid", "10", "0"],
            ["binance", "BTCUSDT", "915", "2000", "false", "ask", "12", "1"],
        ],
    );
    let out = dir.path().join("out");
    let result = compile_l2_csv(&options(vec![path.clone()], &out)).unwrap();

    assert!(result.evlog_path.exists());
    assert!(result.index_path.exists());
    assert!(result.manifest_path.exists());
    assert_eq!(result.record_count, 2);

    // Replay through the reference book.
    let mut book = LevelBook::new();
    let mut reader =
        EvlogReader::open_with_index(&result.evlog_path, &result.index_path).unwrap();
    let batches: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
    let batches = batches.unwrap();
    assert_eq!(batches.len(), 2);
    assert!(batches[0].resets_book);

    book.apply_l2_batch(&batches[0]).unwrap();
    let (bid, ask) = book.best_bid_ask();
    assert_eq!(bid, Some((10, 1)));
    assert_eq!(ask, Some((11, 2)));

    book.apply_l2_batch(&batches[1]).unwrap();
    let (bid, ask) = book.best_bid_ask();
    assert_eq!(bid, None);
    assert_eq!(ask, Some((11, 2)));
}

#[test]
fn test_manifest_fields_and_self_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
        ],
    );
    let out = dir.path().join("out");
    let result = compile_l2_csv(&options(vec![path.clone()], &out)).unwrap();

    let text = std::fs::read_to_string(&result.manifest_path).unwrap();
    assert!(text.ends_with('\n'));
    let manifest: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(manifest["manifest_version"], 1);
    assert_eq!(manifest["compiler_version"], 1);
    assert_eq!(manifest["format_version"], 1);
    assert_eq!(manifest["record_count"], 1);
    assert_eq!(manifest["exchange"], "binance");
    assert_eq!(manifest["symbol"], "BTCUSDT");
    assert_eq!(
        manifest["inputs"][0]["path"],
        path.to_string_lossy().as_ref()
    );
    assert_eq!(manifest["quantizer"]["price_increment"], "1");
    assert_eq!(manifest["quantizer"]["amount_increment"], "1");
    for key in ["compiler_sha256", "inputs_sha256", "manifest_sha256"] {
        assert_eq!(manifest[key].as_str().unwrap().len(), 64, "{key}");
    }
    assert_eq!(manifest["evlog"]["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(manifest["index"]["sha256"].as_str().unwrap().len(), 64);

    // The sealed hash covers the manifest without its own field.
    let mut unsealed = manifest.clone();
    unsealed.as_object_mut().unwrap().remove("manifest_sha256");
    let recomputed = l2_backtest::core::hash_json(&unsealed).unwrap();
    assert_eq!(manifest["manifest_sha256"], recomputed);

    // Header identifiers match the manifest.
    let reader = EvlogReader::open(&result.evlog_path).unwrap();
    let header = reader.header();
    assert_eq!(
        header.exchange_id.unwrap(),
        manifest["exchange_id"].as_u64().unwrap()
    );
    assert_eq!(
        header.symbol_id.unwrap(),
        manifest["symbol_id"].as_u64().unwrap()
    );
    let quantizer_hex: String = header
        .quantizer_hash
        .unwrap()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    assert_eq!(manifest["quantizer"]["sha256"], quantizer_hex);
}

#[test]
fn test_compile_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
            ["binance", "BTCUSDT", "910", "2000", "false", "ask", "12", "3"],
        ],
    );
    let out = dir.path().join("out");

    let first = compile_l2_csv(&options(vec![path.clone()], &out)).unwrap();
    let evlog_1 = std::fs::read(&first.evlog_path).unwrap();
    let index_1 = std::fs::read(&first.index_path).unwrap();
    let manifest_1 = std::fs::read(&first.manifest_path).unwrap();

    let second = compile_l2_csv(&options(vec![path], &out)).unwrap();
    assert_eq!(evlog_1, std::fs::read(&second.evlog_path).unwrap());
    assert_eq!(index_1, std::fs::read(&second.index_path).unwrap());
    assert_eq!(manifest_1, std::fs::read(&second.manifest_path).unwrap());
}

#[test]
fn test_compile_multiple_inputs_requires_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path_1 = write_l2(
        dir.path(),
        "l2_1.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
        ],
    );
    let path_2 = write_l2(
        dir.path(),
        "l2_2.csv",
        &[
            ["binance", "BTCUSDT", "910", "2000", "false", "bid", "10", "0"],
            ["binance", "BTCUSDT", "915", "2000", "false", "ask", "12", "1"],
        ],
    );
    let out = dir.path().join("out");

    let missing_prefix = options(vec![path_1.clone(), path_2.clone()], &out);
    assert!(matches!(
        compile_l2_csv(&missing_prefix),
        Err(BacktestError::Schema { .. })
    ));

    let mut with_prefix = options(vec![path_1, path_2], &out);
    with_prefix.output_prefix = Some("binance-BTCUSDT-2020-01-01".to_string());
    let result = compile_l2_csv(&with_prefix).unwrap();
    assert_eq!(result.record_count, 2);
    assert!(
        result
            .evlog_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("binance-BTCUSDT-2020-01-01")
    );

    let manifest: Value =
        serde_json::from_str(&std::fs::read_to_string(&result.manifest_path).unwrap()).unwrap();
    assert_eq!(manifest["inputs"].as_array().unwrap().len(), 2);
}

#[test]
fn test_compile_rejects_duplicate_and_missing_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"]],
    );
    let out = dir.path().join("out");

    let duplicate = options(vec![path.clone(), path.clone()], &out);
    assert!(compile_l2_csv(&duplicate).is_err());

    let missing = options(vec![dir.path().join("absent.csv")], &out);
    assert!(compile_l2_csv(&missing).is_err());

    let empty = options(vec![], &out);
    assert!(compile_l2_csv(&empty).is_err());
}

#[test]
fn test_compile_quarantine_skip_row_writes_sink_file() {
    // A bad amount on the first row of the batch: the row is dropped,
    // the remaining ask survives, and the sink holds one record.
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "-1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
        ],
    );
    let out = dir.path().join("out");
    let mut opts = options(vec![path], &out);
    opts.failure_policy = FailurePolicy::Quarantine;
    opts.quarantine_action = QuarantineAction::SkipRow;

    let result = compile_l2_csv(&opts).unwrap();
    assert_eq!(result.record_count, 1);

    let mut reader = EvlogReader::open(&result.evlog_path).unwrap();
    let batches: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
    let batches = batches.unwrap();
    assert_eq!(batches[0].updates.len(), 1);
    assert_eq!(batches[0].updates[0].side, Side::Ask);

    let quarantine = out.join("l2.quarantine.jsonl");
    let content = std::fs::read_to_string(&quarantine).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["line_number"], 2);
    assert_eq!(record["payload"]["side"], "bid");
    assert_eq!(record["payload"]["amount"], "-1");
    assert!(record["reason"].as_str().unwrap().contains("at line 2"));
}

#[test]
fn test_compile_crossed_book_detected_on_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "9", "1"],
        ],
    );
    let out = dir.path().join("out");
    let result = compile_l2_csv(&options(vec![path], &out)).unwrap();

    let snapshots: Result<Vec<_>, _> =
        iter_best_bid_ask(&result.evlog_path, None).unwrap().collect();
    let err = snapshots.unwrap_err();
    assert_eq!(format!("{err}"), "schema error: crossed book");
}

#[test]
fn test_compile_gzip_input_matches_plain() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let rows = [
        ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
        ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
    ];
    let plain = write_l2(dir.path(), "l2.csv", &rows);

    let gz_path = dir.path().join("l2.csv.gz");
    let mut encoder = GzEncoder::new(
        std::fs::File::create(&gz_path).unwrap(),
        Compression::default(),
    );
    encoder
        .write_all(std::fs::read(&plain).unwrap().as_slice())
        .unwrap();
    encoder.finish().unwrap();

    let out_plain = dir.path().join("out_plain");
    let out_gz = dir.path().join("out_gz");
    let result_plain = compile_l2_csv(&options(vec![plain], &out_plain)).unwrap();
    let result_gz = compile_l2_csv(&options(vec![gz_path], &out_gz)).unwrap();

    // Identical event-log bytes regardless of transport encoding; both
    // land on the same "l2" base name.
    assert_eq!(
        std::fs::read(&result_plain.evlog_path).unwrap(),
        std::fs::read(&result_gz.evlog_path).unwrap()
    );
    assert!(result_gz.evlog_path.ends_with("l2.evlog"));
}

#[test]
fn test_seek_time_after_compile() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10", "1"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "11", "2"],
            ["binance", "BTCUSDT", "910", "2000", "false", "ask", "12", "1"],
        ],
    );
    let out = dir.path().join("out");
    let result = compile_l2_csv(&options(vec![path], &out)).unwrap();

    let mut reader =
        EvlogReader::open_with_index(&result.evlog_path, &result.index_path).unwrap();
    reader.seek_time(2_000_000).unwrap();
    let batches: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
    let batches = batches.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].ts_recv_ns, 2_000_000);
}

#[test]
fn test_infer_increments_feed_compile() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_l2(
        dir.path(),
        "l2.csv",
        &[
            ["binance", "BTCUSDT", "900", "1000", "true", "bid", "10.05", "0.2"],
            ["binance", "BTCUSDT", "905", "1000", "true", "ask", "10.15", "0.4"],
        ],
    );
    let (price_inc, amount_inc) = infer_l2_increments(std::slice::from_ref(&path)).unwrap();
    assert_eq!(price_inc, "0.05");
    assert_eq!(amount_inc, "0.2");

    let out = dir.path().join("out");
    let mut opts = options(vec![path], &out);
    opts.quantizer = Quantizer::from_strs(&price_inc, &amount_inc).unwrap();
    let result = compile_l2_csv(&opts).unwrap();

    let mut reader = EvlogReader::open(&result.evlog_path).unwrap();
    let batches: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
    let batch = &batches.unwrap()[0];
    assert_eq!(batch.updates[0].price_ticks, 201); // 10.05 / 0.05
    assert_eq!(batch.updates[0].amount_lots, 1);
    assert_eq!(batch.updates[1].price_ticks, 203);
    assert_eq!(batch.updates[1].amount_lots, 2);
}
