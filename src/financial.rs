//! Optional reported fundamentals, one CSV per symbol under
//! `<financial_dir>/info/` and `<financial_dir>/balance_sheet/`.
//!
//! Only the first data row of each file is used; its first column is a row
//! label and every other cell that parses as a number becomes a field.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};
use tracing::{debug, info, warn};

pub const INFO_DIR: &str = "info";
pub const BALANCE_SHEET_DIR: &str = "balance_sheet";

/// Numeric fields of one statement, keyed by column header.
pub type Record = BTreeMap<String, f64>;

/// Statements available for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Financials {
    pub info: Option<Record>,
    pub balance_sheet: Option<Record>,
}

/// Every statement found under the financial directory, keyed by upper-case symbol.
#[derive(Debug, Clone, Default)]
pub struct FinancialStore {
    info: HashMap<String, Record>,
    balance_sheet: HashMap<String, Record>,
}

impl FinancialStore {
    /// Load what is readable; a missing directory or file only logs a warning.
    pub fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            info!("no financial directory given, fundamentals are estimated from prices");
            return Self::default();
        };
        info!("loading financial data from {}", dir.display());
        Self {
            info: load_kind(&dir.join(INFO_DIR)),
            balance_sheet: load_kind(&dir.join(BALANCE_SHEET_DIR)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty() && self.balance_sheet.is_empty()
    }

    /// Statements for `symbol`, trying `0002.HK` / `0002_HK` spellings as well.
    pub fn lookup(&self, symbol: &str) -> Financials {
        Financials {
            info: find(&self.info, symbol),
            balance_sheet: find(&self.balance_sheet, symbol),
        }
    }
}

fn find(records: &HashMap<String, Record>, symbol: &str) -> Option<Record> {
    [
        symbol.to_string(),
        symbol.replace('_', "."),
        symbol.replace('.', "_"),
    ]
    .iter()
    .find_map(|variant| records.get(&variant.to_uppercase()).cloned())
}

fn load_kind(dir: &Path) -> HashMap<String, Record> {
    let mut records = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("financial data directory {} unavailable: {}", dir.display(), e);
            return records;
        }
    };
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        if path.extension().and_then(|x| x.to_str()) != Some("csv") {
            continue;
        }
        let Some(symbol) = path.file_stem().and_then(|s| s.to_str()).map(str::to_uppercase) else {
            continue;
        };
        match read_first_row(&path) {
            Ok(Some(record)) => {
                records.insert(symbol, record);
            }
            Ok(None) => debug!("{}: no data rows", path.display()),
            Err(e) => warn!("{:#}", e),
        }
    }
    info!("{}: {} symbols", dir.display(), records.len());
    records
}

fn read_first_row(path: &Path) -> Result<Option<Record>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    let Some(row) = rdr
        .records()
        .next()
        .transpose()
        .with_context(|| format!("read {}", path.display()))?
    else {
        return Ok(None);
    };
    let record = headers
        .iter()
        .zip(row.iter())
        .skip(1)
        .filter_map(|(key, cell)| {
            let value = cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some((key.trim().to_string(), value))
        })
        .collect();
    Ok(Some(record))
}
