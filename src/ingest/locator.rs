//! Locate vendor CSV files on disk.
//!
//! Two on-disk layouts are recognized under a data root:
//!
//! ```text
//! root/exchange/data_type/date/SYMBOL[.._suffix].csv[.gz]   (date dirs)
//! root/exchange/data_type/SYMBOL/date[.._suffix].csv[.gz]   (symbol dirs)
//! ```
//!
//! Matching both layouts at once is ambiguous and rejected.

use crate::core::error::BacktestError;
use std::path::{Path, PathBuf};

/// Resolves vendor data files under a fixed root directory.
#[derive(Debug, Clone)]
pub struct DataLocator {
    root: PathBuf,
}

impl DataLocator {
    /// Create a locator for the given data root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find all files for `(exchange, data_type, date, symbol_or_group)`,
    /// sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`BacktestError::Schema`] when the root is missing, the
    /// date is malformed, no files match, or both layouts match.
    pub fn find(
        &self,
        exchange: &str,
        data_type: &str,
        date: &str,
        symbol_or_group: &str,
    ) -> Result<Vec<PathBuf>, BacktestError> {
        if !self.root.exists() {
            return Err(BacktestError::schema(format!(
                "data root not found: {}",
                self.root.display()
            )));
        }
        if !self.root.is_dir() {
            return Err(BacktestError::schema(format!(
                "data root not a directory: {}",
                self.root.display()
            )));
        }
        require_str(exchange, "exchange")?;
        require_str(data_type, "data_type")?;
        require_str(symbol_or_group, "symbol_or_group")?;
        validate_date(date)?;

        let date_dir = self.root.join(exchange).join(data_type).join(date);
        let symbol_dir = self.root.join(exchange).join(data_type).join(symbol_or_group);
        let matches_date_dir = collect_matches(&date_dir, symbol_or_group)?;
        let matches_symbol_dir = collect_matches(&symbol_dir, date)?;

        if !matches_date_dir.is_empty() && !matches_symbol_dir.is_empty() {
            return Err(BacktestError::schema(
                "ambiguous data layout: matches found in date and symbol dirs",
            ));
        }
        let mut matches = if matches_date_dir.is_empty() {
            matches_symbol_dir
        } else {
            matches_date_dir
        };
        if matches.is_empty() {
            return Err(BacktestError::schema("no data files found"));
        }
        matches.sort();
        Ok(matches)
    }
}

fn require_str(value: &str, field: &str) -> Result<(), BacktestError> {
    if value.is_empty() {
        return Err(BacktestError::schema(format!("{field} empty")));
    }
    Ok(())
}

fn validate_date(value: &str) -> Result<(), BacktestError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && value
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(BacktestError::schema(format!("invalid date: {value:?}")));
    }
    Ok(())
}

fn strip_csv_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(".csv.gz")
        .or_else(|| name.strip_suffix(".csv"))
}

fn match_prefix(base: &str, prefix: &str) -> bool {
    if base == prefix {
        return true;
    }
    ["_", "-"]
        .iter()
        .any(|sep| base.starts_with(&format!("{prefix}{sep}")))
}

fn collect_matches(dir: &Path, key: &str) -> Result<Vec<PathBuf>, BacktestError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(BacktestError::schema(format!(
            "not a directory: {}",
            dir.display()
        )));
    }
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| BacktestError::io_at(&e, dir))? {
        let entry = entry.map_err(|e| BacktestError::io_at(&e, dir))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(base) = strip_csv_suffix(name) else {
            continue;
        };
        if match_prefix(base, key) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}
