use chrono::{Duration, Local, NaiveDate};
use qlib_indicators::{
    CalcArgs,
    batch::{run_full, run_incremental},
    cache::{BACKUP_DIR, CacheStore, DATE_RANGES_FILE, STOCK_STATUS_FILE, acquire_lock},
    config::CalcConfig,
    indicators::expected_indicator_count,
    output::{list_backups, read_output},
    qlib::{FIELDS, field_file},
    status::{DateRange, StockStatus, UpdatePolicy, UpdateReason},
};
use std::{collections::BTreeMap, fs, io::Write, path::Path};
use tempfile::TempDir;

const DAYS: usize = 70;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
}

fn write_calendar(root: &Path, days: usize) {
    fs::create_dir_all(root.join("calendars")).unwrap();
    let text: String = (0..days).map(|i| format!("{}\n", day(i))).collect();
    fs::write(root.join("calendars/day.txt"), text).unwrap();
}

fn write_symbol(root: &Path, symbol: &str, base: f32) {
    write_symbol_days(root, symbol, base, DAYS);
}

fn write_symbol_days(root: &Path, symbol: &str, base: f32, days: usize) {
    let dir = root.join("features").join(symbol.to_lowercase());
    fs::create_dir_all(&dir).unwrap();
    for field in FIELDS {
        let mut f = fs::File::create(dir.join(field_file(field))).unwrap();
        for i in 0..days {
            let t = i as f32;
            let close = base + 0.2 * t + (t * 0.5).sin();
            let v = match field {
                "open" => close - 0.3,
                "high" => close + 1.0,
                "low" => close - 1.0,
                "close" => close,
                _ => 1000.0 + 10.0 * t,
            };
            f.write_all(&v.to_le_bytes()).unwrap();
        }
    }
}

struct Fixture {
    _tmp: TempDir,
    data: std::path::PathBuf,
    cfg: CalcConfig,
}

fn fixture(symbols: &[(&str, f32)]) -> Fixture {
    fixture_days(symbols, DAYS)
}

fn fixture_days(symbols: &[(&str, f32)], days: usize) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("qlib");
    write_calendar(&data, days);
    fs::create_dir_all(data.join("features")).unwrap();
    for (s, base) in symbols {
        write_symbol_days(&data, s, *base, days);
    }
    let args = CalcArgs {
        data_dir: Some(data.clone()),
        output: Some(tmp.path().join("indicators.csv")),
        cache_dir: Some(tmp.path().join("cache")),
        batch_size: Some(1),
        workers: Some(2),
        parallel_families: Some(false),
        incremental: Some(true),
        ..Default::default()
    };
    let cfg = CalcConfig::from_args(&args).unwrap();
    Fixture {
        _tmp: tmp,
        data,
        cfg,
    }
}

fn statuses(cfg: &CalcConfig) -> BTreeMap<String, StockStatus> {
    let text = fs::read_to_string(cfg.cache_dir.join(STOCK_STATUS_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn ranges(cfg: &CalcConfig) -> BTreeMap<String, DateRange> {
    let text = fs::read_to_string(cfg.cache_dir.join(DATE_RANGES_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn decision(cfg: &CalcConfig, symbol: &str, observed: (NaiveDate, NaiveDate)) -> UpdateReason {
    let cache = CacheStore::open(&cfg.cache_dir, expected_indicator_count()).unwrap();
    cache.tracker.evaluate(
        symbol,
        Some(observed),
        false,
        &UpdatePolicy::default(),
        Local::now().naive_local(),
    )
}

#[tokio::test]
async fn only_new_symbol_is_computed() {
    let fx = fixture(&[("AAA", 20.0)]);

    let first = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((first.processed, first.skipped, first.failed), (1, 0, 0));
    assert_eq!(first.backup, None);
    let aaa_before = statuses(&fx.cfg)["AAA"].clone();
    assert!(aaa_before.success);
    assert_eq!(aaa_before.row_count, DAYS);
    assert_eq!(aaa_before.indicator_count, expected_indicator_count());

    write_symbol(&fx.data, "BBB", 35.0);
    let second = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!(second.total, 2);
    assert_eq!((second.processed, second.skipped), (1, 1));

    let after = statuses(&fx.cfg);
    assert_eq!(after["AAA"].last_update, aaa_before.last_update);
    assert!(after["BBB"].success);

    let out = read_output(&fx.cfg.output).unwrap();
    assert_eq!(out.symbol_count(), 2);
    assert_eq!(out.len(), 2 * DAYS);
    assert_eq!(second.rows_written, 2 * DAYS);

    // the second run backed up the first run's output
    let backups = list_backups(&fx.cfg.cache_dir.join(BACKUP_DIR)).unwrap();
    assert_eq!(backups.len(), 1);
}

#[tokio::test]
async fn unchanged_data_is_skipped_and_changed_data_recomputed() {
    let fx = fixture(&[("AAA", 20.0), ("BBB", 35.0)]);
    run_incremental(&fx.cfg).await.unwrap();
    let written = fs::read(&fx.cfg.output).unwrap();

    let idle = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((idle.processed, idle.skipped), (0, 2));
    assert_eq!(fs::read(&fx.cfg.output).unwrap(), written);

    write_symbol(&fx.data, "BBB", 36.0);
    let bbb_before = statuses(&fx.cfg)["BBB"].last_update;
    let changed = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((changed.processed, changed.skipped), (1, 1));
    assert_ne!(statuses(&fx.cfg)["BBB"].last_update, bbb_before);
    assert_eq!(read_output(&fx.cfg.output).unwrap().len(), 2 * DAYS);
}

#[tokio::test]
async fn forced_update_recomputes_everything() {
    let mut fx = fixture(&[("AAA", 20.0), ("BBB", 35.0)]);
    run_incremental(&fx.cfg).await.unwrap();
    fx.cfg.policy.force = true;
    let forced = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!(forced.processed, 2);
    assert_eq!(read_output(&fx.cfg.output).unwrap().len(), 2 * DAYS);
}

#[tokio::test]
async fn full_run_writes_all_symbols_without_cache_state() {
    let mut fx = fixture(&[("AAA", 20.0), ("BBB", 35.0), ("CCC", 50.0)]);
    fx.cfg.incremental = false;
    fx.cfg.max_stocks = Some(2);
    let summary = run_full(&fx.cfg).await.unwrap();
    assert_eq!((summary.total, summary.processed), (2, 2));

    let out = read_output(&fx.cfg.output).unwrap();
    assert_eq!(out.symbol_count(), 2);
    assert_eq!(out.columns.len(), 7 + expected_indicator_count());
    assert!(!fx.cfg.cache_dir.join(STOCK_STATUS_FILE).exists());
}

#[tokio::test]
async fn failed_symbol_is_retried_on_the_next_run() {
    // long enough that no computation beats a zero timeout
    let days = 2000;
    let mut fx = fixture_days(&[("AAA", 20.0)], days);
    run_incremental(&fx.cfg).await.unwrap();
    let written = fs::read(&fx.cfg.output).unwrap();

    fx.cfg.policy.force = true;
    fx.cfg.task_timeout = std::time::Duration::ZERO;
    let timed_out = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((timed_out.processed, timed_out.failed), (0, 1));
    assert_eq!(fs::read(&fx.cfg.output).unwrap(), written);

    let status = &statuses(&fx.cfg)["AAA"];
    assert!(!status.success);
    assert_eq!(status.row_count, 0);
    let range = &ranges(&fx.cfg)["AAA"];
    assert_eq!((range.start_date, range.end_date), (day(0), day(days - 1)));
    assert_eq!(
        decision(&fx.cfg, "AAA", (day(0), day(days - 1))),
        UpdateReason::PreviousFailure
    );

    fx.cfg.policy.force = false;
    fx.cfg.task_timeout = std::time::Duration::from_secs(120);
    let retried = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((retried.processed, retried.failed), (1, 0));
    assert!(statuses(&fx.cfg)["AAA"].success);
    assert_eq!(read_output(&fx.cfg.output).unwrap().len(), days);
}

#[tokio::test]
async fn later_end_date_is_merged_with_earlier_output() {
    let fx = fixture(&[("AAA", 20.0), ("BBB", 35.0)]);
    run_incremental(&fx.cfg).await.unwrap();

    // BBB leaves the universe, its rows stay in the previous output
    fs::remove_dir_all(fx.data.join("features/bbb")).unwrap();
    let extended = DAYS + 10;
    write_calendar(&fx.data, extended);
    write_symbol_days(&fx.data, "AAA", 20.0, extended);
    assert_eq!(
        decision(&fx.cfg, "AAA", (day(0), day(extended - 1))),
        UpdateReason::RangeExtendedEnd {
            recorded: day(DAYS - 1),
            observed: day(extended - 1),
        }
    );

    let run = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((run.total, run.processed), (1, 1));
    assert_eq!(ranges(&fx.cfg)["AAA"].end_date, day(extended - 1));
    assert_eq!(statuses(&fx.cfg)["AAA"].row_count, extended);

    let out = read_output(&fx.cfg.output).unwrap();
    assert_eq!(out.symbol_count(), 2);
    assert_eq!(out.len(), extended + DAYS);
    assert_eq!(run.rows_written, extended + DAYS);
}

#[tokio::test]
async fn recorded_indicator_count_mismatch_triggers_recompute() {
    let fx = fixture(&[("AAA", 20.0), ("BBB", 35.0)]);
    run_incremental(&fx.cfg).await.unwrap();

    let mut recorded = statuses(&fx.cfg);
    let aaa = recorded.get_mut("AAA").unwrap();
    aaa.indicator_count = expected_indicator_count() - 1;
    fs::write(
        fx.cfg.cache_dir.join(STOCK_STATUS_FILE),
        serde_json::to_string_pretty(&recorded).unwrap(),
    )
    .unwrap();
    assert_eq!(
        decision(&fx.cfg, "AAA", (day(0), day(DAYS - 1))),
        UpdateReason::IndicatorCountChanged {
            current: expected_indicator_count() - 1,
            expected: expected_indicator_count(),
        }
    );

    let run = run_incremental(&fx.cfg).await.unwrap();
    assert_eq!((run.processed, run.skipped), (1, 1));
    assert_eq!(statuses(&fx.cfg)["AAA"].indicator_count, expected_indicator_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_waits_for_the_lock_holder() {
    let mut fx = fixture(&[("AAA", 20.0)]);
    let lock = fx.cfg.cache_dir.join("calc.lock");
    fx.cfg.lock_file = Some(lock.clone());

    let guard = acquire_lock(&lock).unwrap();
    let cfg = fx.cfg.clone();
    let mut waiting = tokio::spawn(async move { run_incremental(&cfg).await });

    let blocked = tokio::time::timeout(std::time::Duration::from_millis(300), &mut waiting).await;
    assert!(blocked.is_err(), "run finished while the lock was held");
    assert!(!fx.cfg.output.exists());

    drop(guard);
    let summary = waiting.await.unwrap().unwrap();
    assert_eq!(summary.processed, 1);
    assert!(fx.cfg.output.exists());
}
