use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::info;

use crate::qlib::{FIELDS, field_file};

/// Symbols under `features_dir` that have every field file, upper-cased and sorted.
pub fn available_symbols(features_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(features_dir)
        .with_context(|| format!("features directory {} is not readable", features_dir.display()))?;

    let mut symbols = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if FIELDS.iter().all(|f| path.join(field_file(f)).exists()) {
            symbols.push(entry.file_name().to_string_lossy().to_uppercase());
        }
    }
    symbols.sort();

    info!("found {} symbols with price data", symbols.len());
    Ok(symbols)
}

pub fn limit(mut symbols: Vec<String>, max_stocks: Option<usize>) -> Vec<String> {
    if let Some(n) = max_stocks {
        symbols.truncate(n);
    }
    symbols
}
