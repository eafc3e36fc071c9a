use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Last attempt to compute indicators for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockStatus {
    #[serde(default)]
    pub symbol: String,
    pub last_update: Option<NaiveDateTime>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "rows")]
    pub row_count: usize,
    #[serde(default, alias = "indicators_count")]
    pub indicator_count: usize,
}

/// Observed data range of a symbol at its last successful computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "lenient_date")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "lenient_date")]
    pub end_date: NaiveDate,
    pub last_update: Option<NaiveDateTime>,
}

/// Accepts `2024-01-01` as well as timestamp renderings such as
/// `2024-01-01 00:00:00` or `2024-01-01T00:00:00`.
fn lenient_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_lenient_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised date {:?}", raw)))
}

pub fn parse_lenient_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
}

/// Why a symbol is (or is not) recomputed. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    Forced,
    DataChanged,
    FirstDateRange,
    RangeExtendedStart { recorded: NaiveDate, observed: NaiveDate },
    RangeExtendedEnd { recorded: NaiveDate, observed: NaiveDate },
    RangeChanged,
    FirstComputation,
    PreviousFailure,
    IndicatorCountChanged { current: usize, expected: usize },
    Stale { days: i64 },
    UpToDate,
}

impl UpdateReason {
    pub fn needs_update(&self) -> bool {
        !matches!(self, UpdateReason::UpToDate)
    }

    /// Short tag for grouping decisions in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateReason::Forced => "forced",
            UpdateReason::DataChanged => "data_changed",
            UpdateReason::FirstDateRange => "first_range",
            UpdateReason::RangeExtendedStart { .. } => "start_extended",
            UpdateReason::RangeExtendedEnd { .. } => "end_extended",
            UpdateReason::RangeChanged => "range_changed",
            UpdateReason::FirstComputation => "first_computation",
            UpdateReason::PreviousFailure => "previous_failure",
            UpdateReason::IndicatorCountChanged { .. } => "indicator_count",
            UpdateReason::Stale { .. } => "stale",
            UpdateReason::UpToDate => "up_to_date",
        }
    }
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::Forced => write!(f, "forced update"),
            UpdateReason::DataChanged => write!(f, "price data changed"),
            UpdateReason::FirstDateRange => write!(f, "no recorded date range"),
            UpdateReason::RangeExtendedStart { recorded, observed } => {
                write!(f, "start extended earlier ({} -> {})", recorded, observed)
            }
            UpdateReason::RangeExtendedEnd { recorded, observed } => {
                write!(f, "end extended later ({} -> {})", recorded, observed)
            }
            UpdateReason::RangeChanged => write!(f, "date range changed"),
            UpdateReason::FirstComputation => write!(f, "first computation"),
            UpdateReason::PreviousFailure => write!(f, "previous attempt failed"),
            UpdateReason::IndicatorCountChanged { current, expected } => {
                write!(f, "indicator count changed (recorded {}, expected {})", current, expected)
            }
            UpdateReason::Stale { days } => write!(f, "last updated {} days ago", days),
            UpdateReason::UpToDate => write!(f, "up to date"),
        }
    }
}

/// Knobs for [`StatusTracker::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct UpdatePolicy {
    pub force: bool,
    /// Records older than this many days are recomputed; `None` disables the rule.
    pub stale_after_days: Option<i64>,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            force: false,
            stale_after_days: Some(30),
        }
    }
}

/// In-memory view of `stock_status.json` and `date_ranges.json`.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    statuses: BTreeMap<String, StockStatus>,
    ranges: BTreeMap<String, DateRange>,
    expected_indicators: usize,
}

impl StatusTracker {
    pub fn new(
        mut statuses: BTreeMap<String, StockStatus>,
        mut ranges: BTreeMap<String, DateRange>,
        expected_indicators: usize,
    ) -> Self {
        // documents are keyed by symbol; older files do not repeat it inside the record
        for (symbol, s) in statuses.iter_mut() {
            if s.symbol.is_empty() {
                s.symbol = symbol.clone();
            }
        }
        for (symbol, r) in ranges.iter_mut() {
            if r.symbol.is_empty() {
                r.symbol = symbol.clone();
            }
        }
        Self {
            statuses,
            ranges,
            expected_indicators,
        }
    }

    pub fn statuses(&self) -> &BTreeMap<String, StockStatus> {
        &self.statuses
    }

    pub fn ranges(&self) -> &BTreeMap<String, DateRange> {
        &self.ranges
    }

    pub fn status(&self, symbol: &str) -> Option<&StockStatus> {
        self.statuses.get(symbol)
    }

    pub fn range(&self, symbol: &str) -> Option<&DateRange> {
        self.ranges.get(symbol)
    }

    pub fn expected_indicators(&self) -> usize {
        self.expected_indicators
    }

    pub fn record(
        &mut self,
        symbol: &str,
        success: bool,
        row_count: usize,
        date_range: Option<(NaiveDate, NaiveDate)>,
    ) {
        self.record_at(symbol, success, row_count, date_range, Local::now().naive_local());
    }

    pub fn record_at(
        &mut self,
        symbol: &str,
        success: bool,
        row_count: usize,
        date_range: Option<(NaiveDate, NaiveDate)>,
        now: NaiveDateTime,
    ) {
        self.statuses.insert(
            symbol.to_string(),
            StockStatus {
                symbol: symbol.to_string(),
                last_update: Some(now),
                success,
                row_count,
                indicator_count: self.expected_indicators,
            },
        );
        if let Some((start_date, end_date)) = date_range {
            self.ranges.insert(
                symbol.to_string(),
                DateRange {
                    symbol: symbol.to_string(),
                    start_date,
                    end_date,
                    last_update: Some(now),
                },
            );
        }
    }

    /// Decide whether `symbol` must be recomputed.
    ///
    /// `observed` is the date range of the freshly read data, `data_changed`
    /// the change detector's answer for it.
    pub fn evaluate(
        &self,
        symbol: &str,
        observed: Option<(NaiveDate, NaiveDate)>,
        data_changed: bool,
        policy: &UpdatePolicy,
        now: NaiveDateTime,
    ) -> UpdateReason {
        if policy.force {
            return UpdateReason::Forced;
        }
        if data_changed {
            return UpdateReason::DataChanged;
        }

        if let Some((start, end)) = observed {
            let Some(recorded) = self.ranges.get(symbol) else {
                return UpdateReason::FirstDateRange;
            };
            if start < recorded.start_date {
                return UpdateReason::RangeExtendedStart {
                    recorded: recorded.start_date,
                    observed: start,
                };
            }
            if end > recorded.end_date {
                return UpdateReason::RangeExtendedEnd {
                    recorded: recorded.end_date,
                    observed: end,
                };
            }
            if start > recorded.start_date || end < recorded.end_date {
                return UpdateReason::RangeChanged;
            }
        }

        let Some(status) = self.statuses.get(symbol) else {
            return UpdateReason::FirstComputation;
        };
        if !status.success {
            return UpdateReason::PreviousFailure;
        }
        if status.indicator_count != self.expected_indicators {
            return UpdateReason::IndicatorCountChanged {
                current: status.indicator_count,
                expected: self.expected_indicators,
            };
        }
        if let (Some(limit), Some(last)) = (policy.stale_after_days, status.last_update) {
            let days = (now - last).num_days();
            if days > limit {
                return UpdateReason::Stale { days };
            }
        }
        UpdateReason::UpToDate
    }

    pub fn clear(&mut self) {
        self.statuses.clear();
        self.ranges.clear();
    }

    /// (successful, failed) record counts.
    pub fn counts(&self) -> (usize, usize) {
        let ok = self.statuses.values().filter(|s| s.success).count();
        (ok, self.statuses.len() - ok)
    }
}
