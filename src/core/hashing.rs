//! Stable content hashing and canonical JSON.
//!
//! Every hash the pipeline records (manifest, header identifiers, input
//! descriptors) is SHA-256 over a byte stream that is fully determined by
//! its inputs. JSON payloads are first rendered in a canonical form: keys
//! sorted, compact `,`/`:` separators, ASCII-only output with `\uXXXX`
//! escapes, and integer-only numbers. Two equal payloads therefore always
//! hash identically, on any platform.

use crate::core::error::BacktestError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Chunk size for file hashing (1 MiB).
const FILE_CHUNK_SIZE: usize = 1 << 20;

/// SHA-256 of raw bytes as lowercase hex.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    hex_digest(&Sha256::digest(data))
}

/// SHA-256 of UTF-8 text as lowercase hex.
#[must_use]
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// SHA-256 of UTF-8 text as a raw 32-byte digest.
#[must_use]
pub fn hash_text_bytes(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

/// The low 8 bytes of the SHA-256 of UTF-8 text, little-endian.
///
/// Used to derive the compact exchange/symbol identifiers embedded in the
/// event-log header.
#[must_use]
pub fn hash_text_u64(text: &str) -> u64 {
    let digest = hash_text_bytes(text);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low)
}

/// SHA-256 of a file's contents as lowercase hex, read in 1 MiB chunks.
///
/// # Errors
///
/// Returns [`BacktestError::Io`] if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<String, BacktestError> {
    let mut file = File::open(path).map_err(|e| BacktestError::io_at(&e, path))?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut chunk)
            .map_err(|e| BacktestError::io_at(&e, path))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

/// Render a JSON value in canonical form.
///
/// Object keys are emitted in sorted order, separators are compact
/// (`,` and `:`), and all non-ASCII characters are `\uXXXX`-escaped, so
/// the output is a stable function of the value.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] if the value contains a non-integer
/// number — floats have no canonical text form and would break
/// determinism.
pub fn stable_json(value: &Value) -> Result<String, BacktestError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// SHA-256 of the canonical JSON form of a value, as lowercase hex.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] if the value is not canonicalizable.
pub fn hash_json(value: &Value) -> Result<String, BacktestError> {
    Ok(hash_text(&stable_json(value)?))
}

/// SHA-256 of the canonical JSON form of a value, as a raw 32-byte digest.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] if the value is not canonicalizable.
pub fn hash_json_bytes(value: &Value) -> Result<[u8; 32], BacktestError> {
    Ok(hash_text_bytes(&stable_json(value)?))
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), BacktestError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else {
                return Err(BacktestError::schema(format!(
                    "non-integer number in canonical JSON: {n}"
                )));
            }
        }
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_escaped(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let code = c as u32;
                if code > 0xffff {
                    // Encode astral characters as a UTF-16 surrogate pair.
                    let v = code - 0x10000;
                    let high = 0xd800 + (v >> 10);
                    let low = 0xdc00 + (v & 0x3ff);
                    out.push_str(&format!("\\u{high:04x}\\u{low:04x}"));
                } else {
                    out.push_str(&format!("\\u{code:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
