use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use fs2::FileExt; // for file locking
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::fingerprint::ChangeDetector;
use crate::status::{DateRange, StatusTracker, StockStatus};

pub const METADATA_FILE: &str = "metadata.json";
pub const STOCK_STATUS_FILE: &str = "stock_status.json";
pub const DATA_HASHES_FILE: &str = "data_hashes.json";
pub const DATE_RANGES_FILE: &str = "date_ranges.json";
pub const BACKUP_DIR: &str = "output_backups";

/// Run-level bookkeeping (`metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub last_update: Option<NaiveDateTime>,
    #[serde(default)]
    pub total_stocks: usize,
    #[serde(default)]
    pub processed_stocks: usize,
    #[serde(default)]
    pub failed_stocks: usize,
    #[serde(default)]
    pub skipped_stocks: usize,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub last_output_backup: Option<PathBuf>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            last_update: None,
            total_stocks: 0,
            processed_stocks: 0,
            failed_stocks: 0,
            skipped_stocks: 0,
            version: default_version(),
            output_file: None,
            last_output_backup: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateSummary {
    pub total_stocks: usize,
    pub processed_stocks: usize,
    pub failed_stocks: usize,
    pub last_update: Option<NaiveDateTime>,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeInfo {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl RangeInfo {
    fn new(start_date: NaiveDate, end_date: NaiveDate, rows: Option<usize>) -> Self {
        Self {
            start_date,
            end_date,
            days: (end_date - start_date).num_days() + 1,
            rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub total_stocks: usize,
    pub processed_stocks: usize,
    pub coverage_percentage: f64,
    pub sample_data_ranges: BTreeMap<String, RangeInfo>,
    pub processed_data_ranges: BTreeMap<String, RangeInfo>,
    pub total_processed_days: i64,
    pub average_days_per_stock: f64,
}

/// The cache directory: four JSON documents plus the output backups.
///
/// Everything is loaded up front; each `save_*` rewrites its document whole.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    pub metadata: Metadata,
    pub tracker: StatusTracker,
    pub detector: ChangeDetector,
}

impl CacheStore {
    pub fn open(dir: &Path, expected_indicators: usize) -> Result<Self> {
        fs::create_dir_all(dir.join(BACKUP_DIR))
            .with_context(|| format!("create cache dir {}", dir.display()))?;

        let metadata: Metadata = load_json(&dir.join(METADATA_FILE)).unwrap_or_default();
        let statuses: BTreeMap<String, StockStatus> =
            load_json(&dir.join(STOCK_STATUS_FILE)).unwrap_or_default();
        let ranges: BTreeMap<String, DateRange> =
            load_json(&dir.join(DATE_RANGES_FILE)).unwrap_or_default();
        let hashes: BTreeMap<String, String> =
            load_json(&dir.join(DATA_HASHES_FILE)).unwrap_or_default();

        info!(
            "cache {}: {} status records, {} date ranges, {} fingerprints",
            dir.display(),
            statuses.len(),
            ranges.len(),
            hashes.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            metadata,
            tracker: StatusTracker::new(statuses, ranges, expected_indicators),
            detector: ChangeDetector::new(hashes),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    pub fn save_metadata(&self) -> Result<()> {
        save_json(&self.dir.join(METADATA_FILE), &self.metadata)
    }

    /// Status records, fingerprints and date ranges; persisted after every batch.
    pub fn save_progress(&self) -> Result<()> {
        save_json(&self.dir.join(STOCK_STATUS_FILE), self.tracker.statuses())?;
        save_json(&self.dir.join(DATA_HASHES_FILE), self.detector.hashes())?;
        save_json(&self.dir.join(DATE_RANGES_FILE), self.tracker.ranges())?;
        Ok(())
    }

    /// Delete the cached documents (and backups unless `keep_backups`) and reset state.
    pub fn clean(&mut self, keep_backups: bool) -> Result<()> {
        for name in [METADATA_FILE, STOCK_STATUS_FILE, DATA_HASHES_FILE, DATE_RANGES_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
                info!("removed {}", path.display());
            }
        }
        let backups = self.backup_dir();
        if !keep_backups && backups.exists() {
            fs::remove_dir_all(&backups).with_context(|| format!("remove {}", backups.display()))?;
            info!("removed {}", backups.display());
        }
        fs::create_dir_all(&backups)?;

        self.metadata = Metadata::default();
        self.tracker.clear();
        self.detector.clear();
        Ok(())
    }

    pub fn update_summary(&self, total_stocks: usize) -> UpdateSummary {
        let (processed_stocks, failed_stocks) = self.tracker.counts();
        UpdateSummary {
            total_stocks,
            processed_stocks,
            failed_stocks,
            last_update: self.metadata.last_update,
            output_file: self.metadata.output_file.clone(),
        }
    }

    /// `sample` holds observed ranges of a few symbols; processed ranges come from the cache.
    pub fn coverage(
        &self,
        total_stocks: usize,
        sample: &[(String, NaiveDate, NaiveDate)],
    ) -> CoverageReport {
        let sample_data_ranges = sample
            .iter()
            .map(|(s, start, end)| (s.clone(), RangeInfo::new(*start, *end, None)))
            .collect();

        let processed_data_ranges: BTreeMap<String, RangeInfo> = self
            .tracker
            .statuses()
            .iter()
            .filter(|(_, st)| st.success)
            .filter_map(|(symbol, st)| {
                let r = self.tracker.range(symbol)?;
                Some((
                    symbol.clone(),
                    RangeInfo::new(r.start_date, r.end_date, Some(st.row_count)),
                ))
            })
            .collect();

        let processed = processed_data_ranges.len();
        let total_processed_days: i64 = processed_data_ranges.values().map(|r| r.days).sum();
        CoverageReport {
            total_stocks,
            processed_stocks: processed,
            coverage_percentage: if total_stocks > 0 {
                processed as f64 / total_stocks as f64 * 100.0
            } else {
                0.0
            },
            sample_data_ranges,
            processed_data_ranges,
            total_processed_days,
            average_days_per_stock: if processed > 0 {
                total_processed_days as f64 / processed as f64
            } else {
                0.0
            },
        }
    }

    /// Counters and timestamps written at the end of a run.
    pub fn finish_run(
        &mut self,
        total: usize,
        processed: usize,
        failed: usize,
        skipped: usize,
        output: &Path,
        backup: Option<PathBuf>,
    ) -> Result<()> {
        self.metadata.last_update = Some(Local::now().naive_local());
        self.metadata.total_stocks = total;
        self.metadata.processed_stocks = processed;
        self.metadata.failed_stocks = failed;
        self.metadata.skipped_stocks = skipped;
        self.metadata.output_file = Some(output.to_path_buf());
        if backup.is_some() {
            self.metadata.last_output_backup = backup;
        }
        self.save_metadata()
    }
}

/// A corrupt or unreadable document is logged and treated as absent.
fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from));
    match parsed {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("failed to load {}: {}; starting empty", path.display(), e);
            None
        }
    }
}

/// Pretty JSON written to a temp file beside `path`, then renamed over it.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let f = tmp.as_file_mut();
        serde_json::to_writer_pretty(&mut *f, value)?;
        f.write_all(b"\n")?;
        f.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Acquire an exclusive file lock; keep the file handle alive to hold the lock.
pub fn acquire_lock(lock_path: &Path) -> Result<fs::File> {
    fs::create_dir_all(lock_path.parent().unwrap_or(Path::new("."))).ok();
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("open lock file {}", lock_path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("lock {}", lock_path.display()))?;
    Ok(file)
}
