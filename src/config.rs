use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::CalcArgs;
use crate::qlib::TimeWindow;
use crate::status::UpdatePolicy;

pub const DATA_DIR_ENV: &str = "QLIB_DATA_DIR";
pub const DEFAULT_CACHE_DIR: &str = "indicator_cache";
pub const DEFAULT_OUTPUT: &str = "enhanced_quantitative_indicators.csv";
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STALE_DAYS: i64 = 30;

/// Fully resolved settings of a `calc` run.
#[derive(Debug, Clone)]
pub struct CalcConfig {
    pub data_dir: PathBuf,
    pub output: PathBuf,
    pub cache_dir: PathBuf,
    pub max_stocks: Option<usize>,
    pub batch_size: usize,
    pub workers: usize,
    pub task_timeout: Duration,
    pub parallel_families: bool,
    pub window: TimeWindow,
    pub incremental: bool,
    pub policy: UpdatePolicy,
    pub backup: bool,
    pub lock_file: Option<PathBuf>,
    pub financial_dir: Option<PathBuf>,
}

impl CalcConfig {
    pub fn from_args(args: &CalcArgs) -> Result<Self> {
        Self::from_args_on(args, Local::now().date_naive())
    }

    /// Resolution against a fixed `today`, which anchors `--recent-days`.
    pub fn from_args_on(args: &CalcArgs, today: NaiveDate) -> Result<Self> {
        let data_dir = resolve_data_dir(args.data_dir.as_deref())?;
        let window = TimeWindow::resolve(
            args.start.as_deref(),
            args.end.as_deref(),
            args.recent_days,
            today,
        )?;

        let batch_size = args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let workers = args.workers.unwrap_or(DEFAULT_WORKERS);
        if batch_size == 0 || workers == 0 {
            bail!("--batch-size and --workers must be at least 1");
        }
        let stale_days = args.stale_days.unwrap_or(DEFAULT_STALE_DAYS);
        if stale_days < 0 {
            bail!("--stale-days must not be negative");
        }

        Ok(Self {
            data_dir,
            output: args.output.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            cache_dir: args
                .cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            max_stocks: args.max_stocks,
            batch_size,
            workers,
            task_timeout: Duration::from_secs(
                args.task_timeout_secs.unwrap_or(DEFAULT_TASK_TIMEOUT_SECS),
            ),
            parallel_families: args.parallel_families.unwrap_or(true),
            window,
            incremental: args.incremental.unwrap_or(false),
            policy: UpdatePolicy {
                force: args.force_update.unwrap_or(false),
                stale_after_days: (stale_days > 0).then_some(stale_days),
            },
            backup: args.backup.unwrap_or(true),
            lock_file: args.lock_file.clone(),
            financial_dir: args.financial_dir.clone(),
        })
    }

    /// Window the fingerprints are keyed on: set only when both ends are fixed.
    pub fn fingerprint_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.window.start?, self.window.end?))
    }
}

/// `--data-dir`, then `$QLIB_DATA_DIR`; the directory must contain `features/`.
pub fn resolve_data_dir(arg: Option<&Path>) -> Result<PathBuf> {
    let dir = match arg {
        Some(p) => p.to_path_buf(),
        None => env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .with_context(|| format!("--data-dir not given and {} is not set", DATA_DIR_ENV))?,
    };
    if !dir.join("features").is_dir() {
        bail!("{} has no features/ directory", dir.display());
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("features")).unwrap();
        dir
    }

    #[test]
    fn defaults_fill_in() {
        let dir = data_dir();
        let args = CalcArgs {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let cfg = CalcConfig::from_args(&args).unwrap();
        assert_eq!(cfg.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(cfg.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(cfg.batch_size, 20);
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.task_timeout, Duration::from_secs(300));
        assert!(cfg.backup && cfg.parallel_families && !cfg.incremental);
        assert_eq!(cfg.policy.stale_after_days, Some(30));
        assert!(cfg.window.is_unbounded());
        assert_eq!(cfg.fingerprint_window(), None);
        assert_eq!(cfg.financial_dir, None);

        let with_financials = CalcArgs {
            financial_dir: Some(dir.path().join("financial")),
            ..args
        };
        let cfg = CalcConfig::from_args(&with_financials).unwrap();
        assert_eq!(cfg.financial_dir, Some(dir.path().join("financial")));
    }

    #[test]
    fn stale_zero_disables_and_window_keys_fingerprints() {
        let dir = data_dir();
        let args = CalcArgs {
            data_dir: Some(dir.path().to_path_buf()),
            stale_days: Some(0),
            start: Some("2024-01-01".into()),
            end: Some("2024-06-30".into()),
            ..Default::default()
        };
        let cfg = CalcConfig::from_args(&args).unwrap();
        assert_eq!(cfg.policy.stale_after_days, None);
        let (s, e) = cfg.fingerprint_window().unwrap();
        assert_eq!(s.to_string(), "2024-01-01");
        assert_eq!(e.to_string(), "2024-06-30");
    }

    #[test]
    fn rejects_bad_settings() {
        let dir = data_dir();
        let base = CalcArgs {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let zero_workers = CalcArgs {
            workers: Some(0),
            ..base.clone()
        };
        assert!(CalcConfig::from_args(&zero_workers).is_err());
        let no_features = CalcArgs {
            data_dir: Some(dir.path().join("missing")),
            ..base
        };
        assert!(CalcConfig::from_args(&no_features).is_err());
    }
}
