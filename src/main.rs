use std::path::PathBuf;

use anyhow::Result;
use qlib_indicators::{
    CacheArgs, CalcArgs, CleanArgs, RestoreArgs, batch,
    cache::{BACKUP_DIR, CacheStore},
    config::{self, CalcConfig},
    indicators::expected_indicator_count,
    output,
    qlib::{QlibReader, TimeWindow},
    registry,
};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Symbols whose raw data range is shown in the coverage report.
const COVERAGE_SAMPLE: usize = 5;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute indicators (full, or incremental with --incremental true)
    Calc(CalcArgs),
    /// Print cached run metadata and status counts
    Summary(CacheArgs),
    /// Print processed date coverage against the available symbols
    Coverage(CacheArgs),
    /// Delete cached state so the next incremental run recomputes everything
    CleanCache(CleanArgs),
    /// List output backups, newest first
    Backups(CacheArgs),
    /// Copy a backup over the output file
    Restore(RestoreArgs),
}

fn get_default_calc_args() -> CalcArgs {
    let mut args = CalcArgs::default();
    apply_calc_defaults(&mut args);
    args.incremental = Some(true);
    args
}

fn apply_calc_defaults(args: &mut CalcArgs) {
    if args.output.is_none() {
        args.output = Some(PathBuf::from(config::DEFAULT_OUTPUT));
    }
    if args.cache_dir.is_none() {
        args.cache_dir = Some(PathBuf::from(config::DEFAULT_CACHE_DIR));
    }
    if args.batch_size.is_none() {
        args.batch_size = Some(config::DEFAULT_BATCH_SIZE);
    }
    if args.workers.is_none() {
        args.workers = Some(config::DEFAULT_WORKERS);
    }
    if args.task_timeout_secs.is_none() {
        args.task_timeout_secs = Some(config::DEFAULT_TASK_TIMEOUT_SECS);
    }
    if args.parallel_families.is_none() {
        args.parallel_families = Some(true);
    }
    if args.incremental.is_none() {
        args.incremental = Some(false);
    }
    if args.force_update.is_none() {
        args.force_update = Some(false);
    }
    if args.stale_days.is_none() {
        args.stale_days = Some(config::DEFAULT_STALE_DAYS);
    }
    if args.backup.is_none() {
        args.backup = Some(true);
    }
}

fn apply_cache_defaults(args: &mut CacheArgs) {
    if args.cache_dir.is_none() {
        args.cache_dir = Some(PathBuf::from(config::DEFAULT_CACHE_DIR));
    }
}

fn apply_clean_defaults(args: &mut CleanArgs) {
    if args.cache_dir.is_none() {
        args.cache_dir = Some(PathBuf::from(config::DEFAULT_CACHE_DIR));
    }
    if args.keep_backups.is_none() {
        args.keep_backups = Some(false);
    }
}

fn apply_restore_defaults(args: &mut RestoreArgs) {
    if args.output.is_none() {
        args.output = Some(PathBuf::from(config::DEFAULT_OUTPUT));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    match args.command {
        Some(Command::Calc(mut calc_args)) => {
            apply_calc_defaults(&mut calc_args);
            let cfg = CalcConfig::from_args(&calc_args)?;
            batch::run(&cfg).await?;
        }
        Some(Command::Summary(mut cache_args)) => {
            apply_cache_defaults(&mut cache_args);
            let cache = open_cache(&cache_args)?;
            let total = symbol_universe(&cache_args).map_or(0, |s| s.len());
            println!("{}", serde_json::to_string_pretty(&cache.update_summary(total))?);
        }
        Some(Command::Coverage(mut cache_args)) => {
            apply_cache_defaults(&mut cache_args);
            let cache = open_cache(&cache_args)?;
            let symbols = symbol_universe(&cache_args).unwrap_or_default();
            let sample = sample_ranges(&cache_args, &symbols);
            let report = cache.coverage(symbols.len(), &sample);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(Command::CleanCache(mut clean_args)) => {
            apply_clean_defaults(&mut clean_args);
            let dir = clean_args.cache_dir.clone().unwrap_or_default();
            let mut cache = CacheStore::open(&dir, expected_indicator_count())?;
            cache.clean(clean_args.keep_backups.unwrap_or(false))?;
            info!("cache {} cleared", dir.display());
        }
        Some(Command::Backups(mut cache_args)) => {
            apply_cache_defaults(&mut cache_args);
            let dir = cache_args.cache_dir.clone().unwrap_or_default().join(BACKUP_DIR);
            let backups = output::list_backups(&dir)?;
            if backups.is_empty() {
                println!("no backups in {}", dir.display());
            }
            for b in backups {
                println!("{}", b.display());
            }
        }
        Some(Command::Restore(mut restore_args)) => {
            apply_restore_defaults(&mut restore_args);
            let target = restore_args.output.clone().unwrap_or_default();
            output::restore_backup(&restore_args.backup, &target)?;
        }
        None => {
            // Default behavior: incremental run with defaults
            println!("Running incremental update with default arguments...");
            let cfg = CalcConfig::from_args(&get_default_calc_args())?;
            batch::run(&cfg).await?;
        }
    }
    Ok(())
}

fn open_cache(args: &CacheArgs) -> Result<CacheStore> {
    let dir = args.cache_dir.clone().unwrap_or_default();
    CacheStore::open(&dir, expected_indicator_count())
}

/// Available symbols, or `None` (logged) when no data directory is usable.
fn symbol_universe(args: &CacheArgs) -> Option<Vec<String>> {
    let dir = match config::resolve_data_dir(args.data_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("symbol count unavailable: {:#}", e);
            return None;
        }
    };
    registry::available_symbols(&dir.join("features"))
        .map_err(|e| warn!("symbol count unavailable: {:#}", e))
        .ok()
}

fn sample_ranges(
    args: &CacheArgs,
    symbols: &[String],
) -> Vec<(String, chrono::NaiveDate, chrono::NaiveDate)> {
    let Ok(dir) = config::resolve_data_dir(args.data_dir.as_deref()) else {
        return vec![];
    };
    let Ok(reader) = QlibReader::open(&dir, TimeWindow::default()) else {
        return vec![];
    };
    symbols
        .iter()
        .take(COVERAGE_SAMPLE)
        .filter_map(|s| {
            let prices = reader.read_symbol(s).ok()??;
            let (start, end) = prices.date_range()?;
            Some((s.clone(), start, end))
        })
        .collect()
}
