use anyhow::{Context, Result, bail};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::error::SymbolError;
use crate::table::PriceTable;

/// Field files every symbol directory must carry.
pub const FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Anchor for generated business days when no calendar file exists.
pub const FALLBACK_CALENDAR_END: (i32, u32, u32) = (2025, 6, 27);

pub fn field_file(field: &str) -> String {
    format!("{}.day.bin", field)
}

/// Inclusive date filter applied to every series after calendar alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TimeWindow {
    /// `recent_days` wins over explicit dates; `start >= end` is rejected.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        recent_days: Option<i64>,
        today: NaiveDate,
    ) -> Result<Self> {
        if let Some(days) = recent_days {
            if start.is_some() || end.is_some() {
                warn!("--recent-days given together with --start/--end; using --recent-days");
            }
            if days <= 0 {
                bail!("--recent-days must be positive");
            }
            let start = Duration::try_days(days)
                .and_then(|d| today.checked_sub_signed(d))
                .with_context(|| format!("--recent-days {} reaches before the earliest date", days))?;
            let window = TimeWindow {
                start: Some(start),
                end: Some(today),
            };
            info!("time window: last {} days ({})", days, window);
            return Ok(window);
        }
        let start = start
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .transpose()
            .context("invalid --start")?;
        let end = end
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .transpose()
            .context("invalid --end")?;
        if let (Some(s), Some(e)) = (start, end)
            && s >= e
        {
            bail!("start date {} must be before end date {}", s, e);
        }
        let window = TimeWindow { start, end };
        if window.is_unbounded() {
            info!("time window: all data");
        } else {
            info!("time window: {}", window);
        }
        Ok(window)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "..".into());
        write!(f, "{} to {}", show(self.start), show(self.end))
    }
}

/// Reads Qlib's per-symbol `*.day.bin` float arrays and aligns them to the shared calendar.
#[derive(Debug, Clone)]
pub struct QlibReader {
    features_dir: PathBuf,
    calendar: Vec<NaiveDate>,
    window: TimeWindow,
}

impl QlibReader {
    pub fn open(data_dir: &Path, window: TimeWindow) -> Result<Self> {
        let calendar_path = data_dir.join("calendars").join("day.txt");
        let calendar = if calendar_path.exists() {
            read_calendar(&calendar_path)?
        } else {
            warn!(
                "calendar {} not found; generating business days",
                calendar_path.display()
            );
            vec![]
        };
        Ok(Self {
            features_dir: data_dir.join("features"),
            calendar,
            window,
        })
    }

    pub fn features_dir(&self) -> &Path {
        &self.features_dir
    }

    /// `Ok(None)` when the symbol has no directory.
    pub fn read_symbol(&self, symbol: &str) -> Result<Option<PriceTable>, SymbolError> {
        let dir = self.features_dir.join(symbol.to_lowercase());
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(FIELDS.len());
        for field in FIELDS {
            let path = dir.join(field_file(field));
            if !path.exists() {
                return Err(SymbolError::MissingField(path.display().to_string()));
            }
            columns.push(read_bin(&path)?);
        }

        let len = columns.iter().map(Vec::len).min().unwrap_or(0);
        if columns.iter().any(|c| c.len() != len) {
            debug!("{}: field lengths differ, truncating to {}", symbol, len);
        }
        for c in columns.iter_mut() {
            c.truncate(len);
        }

        let mut fields = columns.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        let table = PriceTable {
            symbol: symbol.to_string(),
            dates: align_dates(&self.calendar, len),
            open: next(),
            high: next(),
            low: next(),
            close: next(),
            volume: next(),
        };

        if self.window.is_unbounded() {
            return Ok(Some(table));
        }
        let filtered = table.window(self.window.start, self.window.end);
        debug!("{}: window filter {} -> {} rows", symbol, table.len(), filtered.len());
        Ok(Some(filtered))
    }
}

/// One date per line; a trailing time component is ignored.
pub fn read_calendar(path: &Path) -> Result<Vec<NaiveDate>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            let day = l.split_whitespace().next().unwrap_or(l);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .with_context(|| format!("bad calendar line {:?} in {}", l, path.display()))
        })
        .collect()
}

/// Little-endian f32 values widened to f64; NaN and infinities become 0.0.
pub fn read_bin(path: &Path) -> Result<Vec<f64>, std::io::Error> {
    let bytes = fs::read(path)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|b| {
            let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if v.is_finite() { v as f64 } else { 0.0 }
        })
        .collect())
}

/// Series are right-aligned to the calendar: the last value is the last calendar day.
pub fn align_dates(calendar: &[NaiveDate], len: usize) -> Vec<NaiveDate> {
    if len <= calendar.len() {
        return calendar[calendar.len() - len..].to_vec();
    }
    let (y, m, d) = FALLBACK_CALENDAR_END;
    let anchor = calendar
        .last()
        .copied()
        .or_else(|| NaiveDate::from_ymd_opt(y, m, d))
        .unwrap_or_default();
    business_days_ending(anchor, len)
}

/// `count` weekdays ending at (or before) `end`, ascending.
pub fn business_days_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut day = end;
    while out.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    out.reverse();
    out
}
