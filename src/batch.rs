//! Full and incremental calculation runs.
//!
//! Symbols are processed in batches; inside a batch a semaphore bounds how
//! many blocking computations run at once, each under its own timeout.
//! Results are collected on the calling task, which alone touches the cache.
//! Prices are read once per symbol and moved into the worker.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use std::{path::PathBuf, sync::Arc};
use tokio::{sync::Semaphore, task, time::timeout};
use tracing::{debug, error, info, warn};

use crate::cache::{BACKUP_DIR, CacheStore, acquire_lock};
use crate::config::CalcConfig;
use crate::error::SymbolError;
use crate::financial::{FinancialStore, Financials};
use crate::fingerprint::PendingFingerprint;
use crate::indicators::{IndicatorTable, compute_indicators, expected_indicator_count};
use crate::output::{backup_output, merge_with_existing, read_output, write_output};
use crate::qlib::QlibReader;
use crate::registry::{available_symbols, limit};
use crate::status::UpdateReason;
use crate::table::{Frame, PriceTable};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
}

/// A symbol scheduled for recomputation.
#[derive(Debug, Clone)]
struct Job {
    symbol: String,
    reason: UpdateReason,
    observed: Option<(NaiveDate, NaiveDate)>,
    pending: PendingFingerprint,
}

/// Loaded inputs of one symbol, handed to a worker as is.
struct Work {
    symbol: String,
    prices: PriceTable,
    financials: Financials,
}

type Outcome = (String, Result<IndicatorTable, SymbolError>);

pub async fn run(cfg: &CalcConfig) -> Result<RunSummary> {
    if cfg.incremental {
        run_incremental(cfg).await
    } else {
        run_full(cfg).await
    }
}

/// Recompute every symbol and overwrite the output.
pub async fn run_full(cfg: &CalcConfig) -> Result<RunSummary> {
    let _lock_guard = cfg.lock_file.as_deref().map(acquire_lock).transpose()?;

    let reader = QlibReader::open(&cfg.data_dir, cfg.window)?;
    let store = FinancialStore::load(cfg.financial_dir.as_deref());
    let symbols = limit(available_symbols(reader.features_dir())?, cfg.max_stocks);
    info!("full run over {} symbols ({})", symbols.len(), cfg.window);

    let mut summary = RunSummary {
        total: symbols.len(),
        output: cfg.output.clone(),
        ..Default::default()
    };
    let mut frames = Vec::new();
    for (n, chunk) in symbols.chunks(cfg.batch_size).enumerate() {
        info!("batch {}: {} symbols", n + 1, chunk.len());
        let mut work = Vec::with_capacity(chunk.len());
        for symbol in chunk {
            match reader.read_symbol(symbol) {
                Ok(Some(prices)) if !prices.is_empty() => work.push(Work {
                    symbol: symbol.clone(),
                    prices,
                    financials: store.lookup(symbol),
                }),
                Ok(_) => {
                    warn!("{}: no price data, skipped", symbol);
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("{}: {}", symbol, e);
                    summary.failed += 1;
                }
            }
        }

        for (symbol, result) in compute_batch(work, cfg).await {
            match result {
                Ok(table) => {
                    summary.processed += 1;
                    frames.push(table.to_frame());
                }
                Err(e) if e.is_empty_data() => {
                    warn!("{}: {}, skipped", symbol, e);
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("{}: {}", symbol, e);
                    summary.failed += 1;
                }
            }
        }
    }

    let mut frame = Frame::concat(frames);
    if frame.is_empty() {
        warn!("no indicator rows computed; {} left unchanged", cfg.output.display());
        return Ok(summary);
    }
    frame.sort_by_date_symbol();
    if cfg.backup {
        summary.backup = backup_output(&cfg.output, &cfg.cache_dir.join(BACKUP_DIR));
    }
    summary.rows_written = write_output(&frame, &cfg.output)?;
    log_summary(&summary);
    Ok(summary)
}

/// Recompute only the symbols whose data, range or status call for it and
/// merge their rows into the previous output.
///
/// Symbols are planned and computed one batch at a time, so only one
/// batch of price tables is held in memory.
pub async fn run_incremental(cfg: &CalcConfig) -> Result<RunSummary> {
    let _lock_guard = cfg.lock_file.as_deref().map(acquire_lock).transpose()?;

    let mut cache = CacheStore::open(&cfg.cache_dir, expected_indicator_count())?;
    let reader = QlibReader::open(&cfg.data_dir, cfg.window)?;
    let store = FinancialStore::load(cfg.financial_dir.as_deref());
    let symbols = limit(available_symbols(reader.features_dir())?, cfg.max_stocks);
    log_previous_output(cfg);

    let mut summary = RunSummary {
        total: symbols.len(),
        output: cfg.output.clone(),
        ..Default::default()
    };
    let mut backed_up = false;
    let mut scheduled = 0;
    let mut frames = Vec::new();

    for (n, chunk) in symbols.chunks(cfg.batch_size).enumerate() {
        let planned = plan(cfg, &mut cache, &reader, chunk, &mut summary);
        if !planned.is_empty() {
            let by_kind = planned.iter().map(|(j, _)| j.reason.kind()).counts();
            info!(
                "batch {}: {} of {} symbols need updating ({})",
                n + 1,
                planned.len(),
                chunk.len(),
                by_kind
                    .iter()
                    .sorted()
                    .map(|(k, n)| format!("{}: {}", k, n))
                    .join(", ")
            );
            scheduled += planned.len();

            if cfg.backup && !backed_up {
                summary.backup = backup_output(&cfg.output, &cache.backup_dir());
                backed_up = true;
            }

            let (jobs, work): (Vec<Job>, Vec<Work>) = planned
                .into_iter()
                .map(|(job, prices)| {
                    let work = Work {
                        symbol: job.symbol.clone(),
                        prices,
                        financials: store.lookup(&job.symbol),
                    };
                    (job, work)
                })
                .unzip();
            let outcomes = compute_batch(work, cfg).await;

            for (job, (symbol, result)) in jobs.into_iter().zip(outcomes) {
                match result {
                    Ok(table) => {
                        debug!("{}: {} rows ({})", symbol, table.len(), job.reason);
                        cache.tracker.record(&symbol, true, table.len(), job.observed);
                        cache.detector.commit(job.pending);
                        frames.push(table.to_frame());
                        summary.processed += 1;
                    }
                    Err(e) => {
                        if e.is_empty_data() {
                            warn!("{}: {}", symbol, e);
                        } else {
                            error!("{}: {}", symbol, e);
                        }
                        cache.tracker.record(&symbol, false, 0, job.observed);
                        summary.failed += 1;
                    }
                }
            }
        }
        cache
            .save_progress()
            .with_context(|| format!("persist progress after batch {}", n + 1))?;
    }

    if scheduled == 0 {
        info!("all symbols up to date");
    }
    let new = Frame::concat(frames);
    if new.is_empty() {
        if scheduled > 0 {
            warn!("no rows computed; {} left unchanged", cfg.output.display());
        }
    } else {
        let merged = merge_with_existing(new, &cfg.output);
        if merged.is_empty() {
            warn!("merge produced no rows; {} left unchanged", cfg.output.display());
        } else {
            summary.rows_written = write_output(&merged, &cfg.output)?;
        }
    }

    cache.finish_run(
        summary.total,
        summary.processed,
        summary.failed,
        summary.skipped,
        &cfg.output,
        summary.backup.clone(),
    )?;
    log_summary(&summary);
    Ok(summary)
}

/// Read each symbol once, fingerprint it and ask the tracker whether it is
/// due. Due symbols keep their loaded prices for the computation.
fn plan(
    cfg: &CalcConfig,
    cache: &mut CacheStore,
    reader: &QlibReader,
    symbols: &[String],
    summary: &mut RunSummary,
) -> Vec<(Job, PriceTable)> {
    let now = Local::now().naive_local();
    let window = cfg.fingerprint_window();
    let mut planned = Vec::new();

    for symbol in symbols {
        let prices = match reader.read_symbol(symbol) {
            Ok(Some(p)) if !p.is_empty() => p,
            Ok(_) => {
                warn!("{}: no price data, skipped", symbol);
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                error!("{}: {}", symbol, e);
                cache.tracker.record(symbol, false, 0, None);
                summary.failed += 1;
                continue;
            }
        };

        let observed = prices.date_range();
        let (changed, pending) = cache.detector.check(symbol, Some(&prices), window);
        let reason = cache.tracker.evaluate(symbol, observed, changed, &cfg.policy, now);
        if reason.needs_update() {
            debug!("{}: update ({})", symbol, reason);
            let job = Job {
                symbol: symbol.clone(),
                reason,
                observed,
                pending,
            };
            planned.push((job, prices));
        } else {
            summary.skipped += 1;
        }
    }
    planned
}

/// Compute `work` concurrently, at most `cfg.workers` at a time.
///
/// Outcomes come back in input order. The semaphore permit lives inside the
/// blocking closure, so a timed-out computation keeps its slot until its
/// thread actually returns; its result is discarded.
async fn compute_batch(work: Vec<Work>, cfg: &CalcConfig) -> Vec<Outcome> {
    let sem = Arc::new(Semaphore::new(cfg.workers));
    let limit = cfg.task_timeout;
    let parallel = cfg.parallel_families;

    let mut tasks = Vec::with_capacity(work.len());
    for Work {
        symbol,
        prices,
        financials,
    } in work
    {
        let permit = sem.clone().acquire_owned().await.ok();
        let handle = tokio::spawn(async move {
            let blocking = task::spawn_blocking(move || {
                let _permit = permit;
                compute_indicators(&prices, &financials, parallel)
            });
            match timeout(limit, blocking).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(SymbolError::Worker(join.to_string())),
                Err(_) => Err(SymbolError::Timeout(limit)),
            }
        });
        tasks.push((symbol, handle));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (symbol, handle) in tasks {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(SymbolError::Worker(e.to_string())));
        outcomes.push((symbol, result));
    }
    outcomes
}

fn log_previous_output(cfg: &CalcConfig) {
    if !cfg.output.exists() {
        info!("no previous output at {}", cfg.output.display());
        return;
    }
    match read_output(&cfg.output) {
        Ok(prev) => match prev.date_span() {
            Some((start, end)) => info!(
                "previous output: {} rows, {} symbols, {} to {}",
                prev.len(),
                prev.symbol_count(),
                start,
                end
            ),
            None => info!("previous output: {} rows without dates", prev.len()),
        },
        Err(e) => warn!("previous output unreadable: {:#}", e),
    }
}

fn log_summary(s: &RunSummary) {
    info!(
        "run complete: {} total, {} processed, {} failed, {} skipped, {} rows -> {}",
        s.total,
        s.processed,
        s.failed,
        s.skipped,
        s.rows_written,
        s.output.display()
    );
}
