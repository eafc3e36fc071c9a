//! Indicator engine: ten independent families computed over one symbol's
//! price history (plus its optional fundamentals) and merged in a fixed order.

pub mod alpha158;
pub mod alpha360;
pub mod cycle;
pub mod fundamental;
pub mod momentum;
pub mod pattern;
pub mod rolling;
pub mod statistic;
pub mod trend;
pub mod volatility;
pub mod volume;

use std::collections::HashSet;
use std::sync::OnceLock;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::SymbolError;
use crate::financial::Financials;
use crate::table::{BASE_COLUMNS, Frame, PriceTable, format_value};

/// Ordered indicator columns of equal length. The first insert of a name wins.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    columns: Vec<(String, Vec<Option<f64>>)>,
    seen: HashSet<String>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; non-finite values are stored as missing.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        let name = name.into();
        if !self.seen.insert(name.clone()) {
            debug!("duplicate indicator {} skipped", name);
            return;
        }
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        self.columns.push((name, values));
    }

    /// Append every column of `other`, keeping existing names.
    pub fn extend(&mut self, other: IndicatorSet) {
        for (name, values) in other.columns {
            self.insert(name, values);
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn columns(&self) -> &[(String, Vec<Option<f64>>)] {
        &self.columns
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Trend,
    Momentum,
    Volatility,
    Volume,
    Cycle,
    Pattern,
    Fundamental,
    Statistic,
    Alpha158,
    Alpha360,
}

impl Family {
    /// Merge order of the output columns.
    pub const ALL: [Family; 10] = [
        Family::Trend,
        Family::Momentum,
        Family::Volatility,
        Family::Volume,
        Family::Cycle,
        Family::Pattern,
        Family::Fundamental,
        Family::Statistic,
        Family::Alpha158,
        Family::Alpha360,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::Trend => "trend",
            Family::Momentum => "momentum",
            Family::Volatility => "volatility",
            Family::Volume => "volume",
            Family::Cycle => "cycle",
            Family::Pattern => "pattern",
            Family::Fundamental => "fundamental",
            Family::Statistic => "statistic",
            Family::Alpha158 => "alpha158",
            Family::Alpha360 => "alpha360",
        }
    }

    /// Rows of history needed before the family produces values.
    pub fn min_rows(self) -> usize {
        match self {
            Family::Fundamental => 1,
            Family::Pattern => 10,
            Family::Alpha158 | Family::Alpha360 => 60,
            _ => 50,
        }
    }

    fn compute(self, prices: &PriceTable, financials: &Financials) -> IndicatorSet {
        match self {
            Family::Trend => trend::compute(prices),
            Family::Momentum => momentum::compute(prices),
            Family::Volatility => volatility::compute(prices),
            Family::Volume => volume::compute(prices),
            Family::Cycle => cycle::compute(prices),
            Family::Pattern => pattern::compute(prices),
            Family::Fundamental => fundamental::compute(prices, financials),
            Family::Statistic => statistic::compute(prices),
            Family::Alpha158 => alpha158::compute(prices),
            Family::Alpha360 => alpha360::compute(prices),
        }
    }

    /// Compute the family, or emit its columns empty when history is too short.
    pub fn evaluate(self, prices: &PriceTable, financials: &Financials) -> IndicatorSet {
        if prices.len() >= self.min_rows() {
            return self.compute(prices, financials);
        }
        debug!(
            "{}: {} rows < {} required for {}, columns left empty",
            prices.symbol,
            prices.len(),
            self.min_rows(),
            self.name()
        );
        let mut set = IndicatorSet::new();
        for name in self.columns() {
            set.insert(name, vec![None; prices.len()]);
        }
        set
    }

    /// Column names the family emits.
    pub fn columns(self) -> Vec<String> {
        self.compute(&PriceTable::empty(""), &Financials::default()).names()
    }
}

/// Every indicator column in output order.
pub fn indicator_columns() -> &'static [String] {
    static COLUMNS: OnceLock<Vec<String>> = OnceLock::new();
    COLUMNS.get_or_init(|| {
        let mut seen = HashSet::new();
        Family::ALL
            .iter()
            .flat_map(|f| f.columns())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    })
}

pub fn expected_indicator_count() -> usize {
    indicator_columns().len()
}

/// Base price columns followed by every indicator column.
pub fn standard_columns() -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(indicator_columns().iter().cloned())
        .collect()
}

/// Prices of one symbol together with the indicators computed from them.
#[derive(Debug, Clone)]
pub struct IndicatorTable {
    pub symbol: String,
    pub prices: PriceTable,
    pub indicators: IndicatorSet,
}

impl IndicatorTable {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// One output row per date: base columns, then indicators.
    pub fn to_frame(&self) -> Frame {
        let p = &self.prices;
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.indicators.names());
        let mut frame = Frame::new(columns);
        frame.rows = (0..p.len())
            .map(|i| {
                let mut row = Vec::with_capacity(frame.columns.len());
                row.push(p.dates[i].format("%Y-%m-%d").to_string());
                row.push(self.symbol.clone());
                for v in [p.open[i], p.high[i], p.low[i], p.close[i], p.volume[i]] {
                    row.push(format_value(Some(v)));
                }
                for (_, values) in self.indicators.columns() {
                    row.push(format_value(values.get(i).copied().flatten()));
                }
                row
            })
            .collect();
        frame
    }
}

/// Compute every family for one symbol.
///
/// With `parallel` the families run on the rayon pool; the merged column
/// order is the same either way.
pub fn compute_indicators(
    prices: &PriceTable,
    financials: &Financials,
    parallel: bool,
) -> Result<IndicatorTable, SymbolError> {
    if prices.is_empty() {
        return Err(SymbolError::NoPriceData);
    }
    let sets: Vec<IndicatorSet> = if parallel {
        Family::ALL.par_iter().map(|f| f.evaluate(prices, financials)).collect()
    } else {
        Family::ALL.iter().map(|f| f.evaluate(prices, financials)).collect()
    };

    let mut indicators = IndicatorSet::new();
    for set in sets {
        indicators.extend(set);
    }
    if indicators.len() != expected_indicator_count() {
        warn!(
            "{}: {} indicator columns, expected {}",
            prices.symbol,
            indicators.len(),
            expected_indicator_count()
        );
    }
    debug!("{}: {} rows x {} indicators", prices.symbol, prices.len(), indicators.len());

    Ok(IndicatorTable {
        symbol: prices.symbol.clone(),
        prices: prices.clone(),
        indicators,
    })
}

/// Deterministic price history that keeps `low <= open, close <= high`.
#[cfg(test)]
pub(crate) fn test_prices(n: usize) -> PriceTable {
    use chrono::{Duration, NaiveDate};

    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap_or_default();
    let mut p = PriceTable::empty("TEST");
    for i in 0..n {
        let t = i as f64;
        let close = 50.0 + 0.15 * t + 4.0 * (t * 0.37).sin() + 1.5 * (t * 1.3).cos();
        let open = close - 0.8 * (t * 0.91).sin();
        let high = open.max(close) + 0.5 + 0.3 * (t * 0.53).cos().abs();
        let low = open.min(close) - 0.5 - 0.3 * (t * 0.71).sin().abs();
        p.dates.push(start + Duration::days(i as i64));
        p.open.push(open);
        p.high.push(high);
        p.low.push(low);
        p.close.push(close);
        p.volume.push(10_000.0 + 2_500.0 * (t * 0.29).sin() + 40.0 * t);
    }
    p
}
