//! Compile vendor L2 CSV into a binary event log.
//!
//! The compiler orchestrates CSV → batcher → writer → index → manifest.
//! Its step order is part of the determinism contract:
//!
//! 1. Validate inputs (exist, are files, unique) and derive the output
//!    base name.
//! 2. Hash every input (sha256).
//! 3. Open the writer with the quantizer hash and the exchange/symbol
//!    identifiers derived from the first row.
//! 4. Stream rows through the batcher into the writer, recording one
//!    index entry per emitted batch.
//! 5. Close the writer; write the index.
//! 6. Re-hash every input; any change is a determinism error.
//! 7. Hash the compiler source, the event log, and the index.
//! 8. Emit the canonical-JSON manifest, sealing it with its own sha256.

use crate::core::config::{FailurePolicy, QuarantineAction};
use crate::core::error::BacktestError;
use crate::core::hashing::{hash_file, hash_json, hash_text, hash_text_u64, stable_json};
use crate::core::quantizer::Quantizer;
use crate::evlog::format::EVLOG_VERSION;
use crate::evlog::index::{IndexEntry, write_index};
use crate::evlog::writer::EvlogWriter;
use crate::ingest::batcher::L2Batcher;
use crate::ingest::csv::{L2Row, L2RowReader};
use crate::ingest::quarantine::{JsonlQuarantineSink, QuarantineSink};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest document version.
pub const MANIFEST_VERSION: u32 = 1;

/// Compiler procedure version recorded in the manifest.
pub const COMPILER_VERSION: u32 = 1;

/// Inputs to one compile run.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// CSV input paths (`.csv` or `.csv.gz`), processed in order.
    pub inputs: Vec<PathBuf>,
    /// Directory the outputs are written into (created if missing).
    pub output_dir: PathBuf,
    /// The quantizer converting decimal fields to ticks/lots.
    pub quantizer: Quantizer,
    /// Failure policy for ingest invariant violations.
    pub failure_policy: FailurePolicy,
    /// Post-quarantine behavior.
    pub quarantine_action: QuarantineAction,
    /// Quarantine output override; defaults to
    /// `{base}.quarantine.jsonl` beside the outputs in quarantine mode.
    pub quarantine_path: Option<PathBuf>,
    /// Output base-name override; required with more than one input.
    pub output_prefix: Option<String>,
}

impl CompileOptions {
    /// Options for a strict (hard-fail) compile of the given inputs.
    #[must_use]
    pub fn new(inputs: Vec<PathBuf>, output_dir: PathBuf, quantizer: Quantizer) -> Self {
        Self {
            inputs,
            output_dir,
            quantizer,
            failure_policy: FailurePolicy::HardFail,
            quarantine_action: QuarantineAction::Halt,
            quarantine_path: None,
            output_prefix: None,
        }
    }
}

/// Output paths and record count of a compile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    /// The compiled event log.
    pub evlog_path: PathBuf,
    /// The time index.
    pub index_path: PathBuf,
    /// The canonical-JSON manifest.
    pub manifest_path: PathBuf,
    /// Number of batch records written.
    pub record_count: u64,
}

/// Compile one or more vendor CSV files into `{base}.evlog`,
/// `{base}.idx`, and `{base}.manifest.json`.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for invalid options or inputs,
/// [`BacktestError::Determinism`] if an input changes while compiling,
/// and any error surfaced by the batcher under the configured failure
/// policy.
pub fn compile_l2_csv(options: &CompileOptions) -> Result<CompileResult, BacktestError> {
    if options.inputs.is_empty() {
        return Err(BacktestError::schema("at least one input path required"));
    }
    let mut seen = std::collections::HashSet::new();
    for path in &options.inputs {
        if !seen.insert(path.to_string_lossy().into_owned()) {
            return Err(BacktestError::schema("duplicate input paths"));
        }
        if !path.exists() {
            return Err(BacktestError::schema(format!(
                "input path not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(BacktestError::schema(format!(
                "input path not a file: {}",
                path.display()
            )));
        }
    }
    std::fs::create_dir_all(&options.output_dir)
        .map_err(|e| BacktestError::io_at(&e, &options.output_dir))?;

    let base = match &options.output_prefix {
        Some(prefix) => {
            validate_output_prefix(prefix)?;
            prefix.clone()
        }
        None if options.inputs.len() == 1 => base_name(&options.inputs[0]),
        None => {
            return Err(BacktestError::schema(
                "output_prefix required for multiple input files",
            ));
        }
    };
    let evlog_path = options.output_dir.join(format!("{base}.evlog"));
    let index_path = options.output_dir.join(format!("{base}.idx"));
    let manifest_path = options.output_dir.join(format!("{base}.manifest.json"));
    let quarantine_path = match (&options.quarantine_path, options.failure_policy) {
        (Some(path), _) => Some(path.clone()),
        (None, FailurePolicy::Quarantine) => {
            Some(options.output_dir.join(format!("{base}.quarantine.jsonl")))
        }
        (None, FailurePolicy::HardFail) => None,
    };

    info!(inputs = options.inputs.len(), base = %base, "compiling l2 csv");

    // Step 2: pre-hash the inputs.
    let mut input_entries: Vec<(String, String)> = Vec::with_capacity(options.inputs.len());
    for path in &options.inputs {
        input_entries.push((path.to_string_lossy().into_owned(), hash_file(path)?));
    }
    let inputs_value = Value::Array(
        input_entries
            .iter()
            .map(|(path, sha)| json!({"path": path, "sha256": sha}))
            .collect(),
    );
    let inputs_hash = hash_json(&inputs_value)?;

    // Step 3: the first row fixes the stream identity.
    let mut rows = open_rows(&options.inputs)?;
    let first_row = match rows.next() {
        Some(row) => row?,
        None => return Err(BacktestError::schema("no rows in input files")),
    };
    let exchange = first_row.exchange.clone();
    let symbol = first_row.symbol.clone();
    let exchange_id = hash_text_u64(&exchange);
    let symbol_id = hash_text_u64(&symbol);
    let quantizer_hash_hex = options.quantizer.hash_hex();
    let quantizer_hash_bytes = options.quantizer.hash_bytes();

    // Step 4: stream batches into the writer.
    let mut sink = match &quarantine_path {
        Some(path) if options.failure_policy == FailurePolicy::Quarantine => {
            Some(JsonlQuarantineSink::create(path)?)
        }
        _ => None,
    };
    let mut entries: Vec<IndexEntry> = Vec::new();
    let mut record_count = 0u64;
    {
        let mut writer =
            EvlogWriter::create(&evlog_path, exchange_id, symbol_id, &quantizer_hash_bytes)?;
        let sink_ref: Option<&mut dyn QuarantineSink> = match &mut sink {
            Some(sink) => Some(sink),
            None => None,
        };
        let batcher = L2Batcher::new(
            std::iter::once(Ok(first_row)).chain(rows),
            options.quantizer.clone(),
            options.failure_policy,
            options.quarantine_action,
            sink_ref,
            "",
        );
        for batch in batcher {
            let batch = batch?;
            let offset = writer.tell();
            writer.write_l2_batch(&batch)?;
            entries.push(IndexEntry {
                ts_recv_ns: batch.ts_recv_ns,
                offset: i64::try_from(offset)
                    .map_err(|_| BacktestError::schema("offset out of i64 range"))?,
            });
            record_count += 1;
        }
        writer.finish()?;
    }
    if let Some(sink) = sink {
        sink.finish()?;
    }

    // Step 5: the index.
    write_index(&index_path, &entries)?;
    debug!(record_count, "event log and index written");

    // Step 6: re-hash the inputs.
    for (path, pre_hash) in &input_entries {
        let current = hash_file(Path::new(path))?;
        if current != *pre_hash {
            return Err(BacktestError::determinism(format!(
                "input changed during compile: {path}"
            )));
        }
    }

    // Step 7: output and self hashes. The compiler's own source is its
    // provenance artifact.
    let compiler_hash = hash_text(include_str!("compiler.rs"));
    let evlog_hash = hash_file(&evlog_path)?;
    let index_hash = hash_file(&index_path)?;

    // Step 8: the sealed manifest.
    let mut manifest = json!({
        "manifest_version": MANIFEST_VERSION,
        "compiler_version": COMPILER_VERSION,
        "compiler_sha256": compiler_hash,
        "inputs": inputs_value,
        "inputs_sha256": inputs_hash,
        "evlog": {
            "path": evlog_path.to_string_lossy(),
            "sha256": evlog_hash,
        },
        "index": {
            "path": index_path.to_string_lossy(),
            "sha256": index_hash,
        },
        "record_count": record_count,
        "exchange": exchange,
        "symbol": symbol,
        "exchange_id": exchange_id,
        "symbol_id": symbol_id,
        "quantizer": {
            "price_increment": options.quantizer.price_increment().to_string(),
            "amount_increment": options.quantizer.amount_increment().to_string(),
            "sha256": quantizer_hash_hex,
        },
        "format_version": EVLOG_VERSION,
    });
    let manifest_sha = hash_json(&manifest)?;
    if let Some(map) = manifest.as_object_mut() {
        map.insert("manifest_sha256".to_string(), Value::String(manifest_sha));
    }
    let mut document = stable_json(&manifest)?;
    document.push('\n');
    std::fs::write(&manifest_path, document)
        .map_err(|e| BacktestError::io_at(&e, &manifest_path))?;

    info!(
        evlog = %evlog_path.display(),
        record_count,
        "compile complete"
    );
    Ok(CompileResult {
        evlog_path,
        index_path,
        manifest_path,
        record_count,
    })
}

/// Open all inputs and chain their rows in input order.
fn open_rows(
    inputs: &[PathBuf],
) -> Result<impl Iterator<Item = Result<L2Row, BacktestError>> + use<>, BacktestError> {
    let mut readers = Vec::with_capacity(inputs.len());
    for path in inputs {
        readers.push(L2RowReader::open(path)?);
    }
    Ok(readers.into_iter().flatten())
}

fn base_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(stripped) = name.strip_suffix(".gz") {
        name = stripped.to_string();
    }
    if let Some(stripped) = name.strip_suffix(".csv") {
        name = stripped.to_string();
    }
    name
}

fn validate_output_prefix(prefix: &str) -> Result<(), BacktestError> {
    if prefix.is_empty() {
        return Err(BacktestError::schema("output_prefix empty"));
    }
    if prefix.contains(std::path::MAIN_SEPARATOR) || prefix.contains('/') {
        return Err(BacktestError::schema("output_prefix must be a basename"));
    }
    Ok(())
}
