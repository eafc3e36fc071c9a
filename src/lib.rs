pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod financial;
pub mod fingerprint;
pub mod indicators;
pub mod labels;
pub mod output;
pub mod qlib;
pub mod registry;
pub mod status;
pub mod table;

use clap::Parser;
use std::path::PathBuf;

/// CLI args
#[derive(Parser, Debug, Clone, Default)]
#[command(
    version,
    about = "Alpha158/Alpha360/technical indicator calculator over Qlib binary data (full or incremental)"
)]
pub struct CalcArgs {
    /// Qlib data directory containing `features/` and `calendars/` (or set QLIB_DATA_DIR env)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Output CSV file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Cache directory for incremental metadata, hashes and backups
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Only process the first N symbols
    #[arg(long)]
    pub max_stocks: Option<usize>,

    /// Symbols per batch; status files are persisted after every batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Worker threads computing symbols concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-symbol timeout in seconds
    #[arg(long)]
    pub task_timeout_secs: Option<u64>,

    /// Compute indicator families of one symbol in parallel
    #[arg(long)]
    pub parallel_families: Option<bool>,

    /// Start date (inclusive), format YYYY-MM-DD
    #[arg(long)]
    pub start: Option<String>,

    /// End date (inclusive), format YYYY-MM-DD
    #[arg(long)]
    pub end: Option<String>,

    /// Only keep the most recent N calendar days (overrides --start/--end)
    #[arg(long)]
    pub recent_days: Option<i64>,

    /// Incremental mode: only recompute symbols whose data or window changed
    #[arg(long)]
    pub incremental: Option<bool>,

    /// With --incremental: recompute every symbol regardless of cached state
    #[arg(long)]
    pub force_update: Option<bool>,

    /// Recompute symbols not updated for this many days (0 disables)
    #[arg(long)]
    pub stale_days: Option<i64>,

    /// Back up the previous output before overwriting it
    #[arg(long)]
    pub backup: Option<bool>,

    /// Optional lock file path to prevent concurrent runs
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Directory of per-symbol fundamentals (`info/`, `balance_sheet/`); estimated from prices when absent
    #[arg(long)]
    pub financial_dir: Option<PathBuf>,
}

/// Shared args for cache inspection commands.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct CacheArgs {
    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Qlib data directory (needed to count available symbols)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Deletes cached metadata so the next incremental run recomputes everything.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct CleanArgs {
    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Keep the output_backups directory
    #[arg(long)]
    pub keep_backups: Option<bool>,
}

/// Copies a backup over the output file.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct RestoreArgs {
    /// Backup file to restore
    #[arg(long)]
    pub backup: PathBuf,

    /// Output file to overwrite
    #[arg(long)]
    pub output: Option<PathBuf>,
}
