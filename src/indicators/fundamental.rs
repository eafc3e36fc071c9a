//! Valuation, profitability and turnover columns.
//!
//! Reported figures are used when the symbol has an `info` record; without
//! one every column is estimated from price and volume. Columns still
//! missing afterwards fall back to fixed market-typical defaults.

use statrs::statistics::Statistics;
use std::collections::HashMap;

use super::IndicatorSet;
use super::rolling::{linreg, rolling_apply, rolling_partial, sample_std};
use crate::financial::{Financials, Record};
use crate::table::PriceTable;

pub const COLUMNS: [&str; 21] = [
    "PriceToBookRatio",
    "MarketCap",
    "PERatio",
    "PriceToSalesRatio",
    "ROE",
    "ROA",
    "ProfitMargins",
    "QuickRatio",
    "DebtToEquity",
    "TobinsQ",
    "DailyTurnover",
    "turnover_c1d",
    "turnover_c5d",
    "turnover_m5d",
    "turnover_c10d",
    "turnover_m10d",
    "turnover_c20d",
    "turnover_m20d",
    "turnover_c30d",
    "turnover_m30d",
    "CurrentRatio",
];

/// Window, cumulative column, moving-average column.
const TURNOVER: [(usize, &str, Option<&str>); 5] = [
    (1, "turnover_c1d", None),
    (5, "turnover_c5d", Some("turnover_m5d")),
    (10, "turnover_c10d", Some("turnover_m10d")),
    (20, "turnover_c20d", Some("turnover_m20d")),
    (30, "turnover_c30d", Some("turnover_m30d")),
];

const DEFAULTS: [(&str, f64); 10] = [
    ("PriceToBookRatio", 1.5),
    ("PERatio", 15.0),
    ("PriceToSalesRatio", 2.0),
    ("ROE", 0.1),
    ("ROA", 0.05),
    ("ProfitMargins", 0.08),
    ("CurrentRatio", 1.2),
    ("QuickRatio", 1.0),
    ("DebtToEquity", 0.5),
    ("TobinsQ", 1.0),
];

/// Estimated float is this multiple of the average daily volume.
const SHARES_PER_AVERAGE_VOLUME: f64 = 50.0;
const FALLBACK_VOLUME: f64 = 1_000_000.0;
const WINDOW: usize = 20;

type Columns = HashMap<&'static str, Vec<f64>>;

pub fn compute(p: &PriceTable, financials: &Financials) -> IndicatorSet {
    let mut cols = match &financials.info {
        Some(info) => reported(p, info, financials.balance_sheet.as_ref()),
        None => estimated(p),
    };
    fill_missing(p, &mut cols);

    let mut set = IndicatorSet::new();
    for name in COLUMNS {
        let values = cols.remove(name).unwrap_or_else(|| vec![f64::NAN; p.len()]);
        set.insert(name, values.into_iter().map(Some).collect());
    }
    set
}

fn reported(p: &PriceTable, info: &Record, balance: Option<&Record>) -> Columns {
    let n = p.len();
    let field = |key: &str| info.get(key).copied();
    let balance_field = |key: &str| balance.and_then(|b| b.get(key).copied());
    let per_close = |f: &dyn Fn(f64) -> f64| p.close.iter().map(|c| f(*c)).collect::<Vec<f64>>();
    let mut cols = Columns::new();

    if let Some(v) = field("priceToBook") {
        cols.insert("PriceToBookRatio", vec![v; n]);
    } else if let Some(book) = field("bookValue").filter(|v| *v > 0.0) {
        cols.insert("PriceToBookRatio", per_close(&|c| c / book));
    }

    if let Some(v) = field("marketCap") {
        cols.insert("MarketCap", vec![v; n]);
    } else if let Some(shares) = field("sharesOutstanding").filter(|v| *v > 0.0) {
        cols.insert("MarketCap", per_close(&|c| c * shares));
    }

    if let Some(v) = field("trailingPE").or_else(|| field("forwardPE")) {
        cols.insert("PERatio", vec![v; n]);
    }
    for (key, column) in [
        ("priceToSalesTrailing12Months", "PriceToSalesRatio"),
        ("returnOnEquity", "ROE"),
        ("returnOnAssets", "ROA"),
        ("profitMargins", "ProfitMargins"),
    ] {
        if let Some(v) = field(key) {
            cols.insert(column, vec![v; n]);
        }
    }

    let current_ratio = balance_field("currentRatio").or_else(|| {
        let assets = balance_field("Total Current Assets")?;
        let liabilities = balance_field("Total Current Liabilities")?;
        (liabilities > 0.0).then(|| assets / liabilities)
    });
    if let Some(v) = current_ratio {
        cols.insert("CurrentRatio", vec![v; n]);
    }
    if let Some(v) = field("quickRatio").or(current_ratio.map(|cr| cr * 0.8)) {
        cols.insert("QuickRatio", vec![v; n]);
    }

    let debt_to_equity = field("debtToEquity").or_else(|| {
        let debt = field("totalDebt")?;
        let cap = field("marketCap")?;
        (cap > 0.0).then(|| debt / cap)
    });
    if let Some(v) = debt_to_equity {
        cols.insert("DebtToEquity", vec![v; n]);
    }

    let enterprise_value = field("enterpriseValue").filter(|v| *v != 0.0);
    let total_assets = balance_field("Total Assets")
        .or_else(|| balance_field("totalAssets"))
        .filter(|v| *v > 0.0);
    if let (Some(ev), Some(assets)) = (enterprise_value, total_assets) {
        cols.insert("TobinsQ", vec![ev / assets; n]);
    }

    let shares = field("floatShares")
        .filter(|v| *v > 0.0)
        .or_else(|| field("sharesOutstanding").filter(|v| *v > 0.0));
    if let Some(shares) = shares {
        let daily = p.volume.iter().map(|v| v / shares).collect();
        insert_turnover(&mut cols, daily, |_| true);
    }
    cols
}

fn estimated(p: &PriceTable) -> Columns {
    let n = p.len();
    let close = &p.close;
    let volume = &p.volume;

    let positive: Vec<f64> = volume.iter().copied().filter(|v| *v > 0.0).collect();
    let avg_volume = if positive.is_empty() {
        FALLBACK_VOLUME
    } else {
        positive.mean()
    };
    let shares = avg_volume * SHARES_PER_AVERAGE_VOLUME;

    let std20 = rolling_apply(close, WINDOW, sample_std);
    let mean20 = rolling_apply(close, WINDOW, |s| Some(s.mean()));
    let volatility: Vec<f64> = (0..n)
        .map(|i| std20[i].unwrap_or(0.0) / mean20[i].unwrap_or(1.0))
        .collect();

    let close_mean = close.mean();
    let slope = rolling_apply(close, WINDOW, |s| linreg(s).map(|(m, _)| m));
    let volume20 = rolling_apply(volume, WINDOW, |s| Some(s.mean()));
    let volume5 = rolling_apply(volume, 5, |s| Some(s.mean()));

    let mut cols = Columns::new();
    cols.insert("MarketCap", close.iter().map(|c| c * shares).collect());
    cols.insert("PriceToBookRatio", volatility.iter().map(|v| 1.0 + 3.0 * v).collect());
    cols.insert(
        "PERatio",
        slope
            .iter()
            .map(|s| (15.0 + s.unwrap_or(0.0) / close_mean * 1000.0).clamp(5.0, 50.0))
            .collect(),
    );
    cols.insert(
        "PriceToSalesRatio",
        volume20
            .iter()
            .map(|m| 1.0 + 2.0 * m.unwrap_or(avg_volume) / avg_volume)
            .collect(),
    );
    let roe: Vec<f64> = (0..n)
        .map(|i| {
            let change = i
                .checked_sub(WINDOW)
                .map_or(0.0, |j| close[i] / close[j] - 1.0);
            (change * 4.0).clamp(-0.3, 0.5)
        })
        .collect();
    cols.insert("ROA", roe.iter().map(|r| r * 0.6).collect());
    cols.insert("ROE", roe);
    cols.insert("ProfitMargins", volatility.iter().map(|v| 0.1 / (1.0 + v)).collect());
    let current: Vec<f64> = (0..n)
        .map(|i| {
            let liquidity = match (volume5[i], volume20[i]) {
                (Some(short), Some(long)) => short / long,
                _ => f64::NAN,
            };
            1.0 + 0.5 * if liquidity.is_nan() { 1.0 } else { liquidity }
        })
        .collect();
    cols.insert("QuickRatio", current.iter().map(|c| c * 0.8).collect());
    cols.insert("CurrentRatio", current);
    cols.insert("DebtToEquity", volatility.iter().map(|v| v * 2.0).collect());
    cols.insert(
        "TobinsQ",
        (0..n)
            .map(|i| {
                let q = (p.high[i] + p.low[i]) / (2.0 * close[i]);
                if q.is_nan() { 1.0 } else { q }
            })
            .collect(),
    );
    insert_turnover(&mut cols, volume.iter().map(|v| v / shares).collect(), |_| true);
    cols
}

/// Daily turnover plus its windowed sums and means, for the columns `wanted` accepts.
fn insert_turnover(cols: &mut Columns, daily: Vec<f64>, wanted: impl Fn(&str) -> bool) {
    let partial = |w: usize, f: fn(&[f64]) -> f64| -> Vec<f64> {
        rolling_partial(&daily, w, |s| Some(f(s)))
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()
    };
    for (w, cumulative, moving) in TURNOVER {
        if wanted(cumulative) {
            cols.insert(cumulative, partial(w, |s| s.iter().sum()));
        }
        if let Some(moving) = moving
            && wanted(moving)
        {
            cols.insert(moving, partial(w, |s| s.iter().sum::<f64>() / s.len() as f64));
        }
    }
    cols.insert("DailyTurnover", daily);
}

fn all_nan(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_nan())
}

/// A turnover column that is missing, all NaN or all zero is recomputed.
fn usable_turnover(v: Option<&Vec<f64>>) -> bool {
    v.is_some_and(|v| !all_nan(v) && !v.iter().all(|x| *x == 0.0))
}

fn fill_missing(p: &PriceTable, cols: &mut Columns) {
    let n = p.len();
    for (name, default) in DEFAULTS {
        if cols.get(name).is_none_or(|v| all_nan(v)) {
            cols.insert(name, vec![default; n]);
        }
    }

    let volume_mean = p.volume.iter().mean();
    let shares = volume_mean * SHARES_PER_AVERAGE_VOLUME;
    if cols.get("MarketCap").is_none_or(|v| all_nan(v)) {
        cols.insert("MarketCap", p.close.iter().map(|c| c * shares).collect());
    }

    let stale: Vec<&str> = TURNOVER
        .iter()
        .flat_map(|(_, c, m)| std::iter::once(*c).chain(*m))
        .filter(|name| !usable_turnover(cols.get(name)))
        .collect();
    if stale.is_empty() {
        return;
    }
    let daily = match cols.get("DailyTurnover") {
        Some(v) if usable_turnover(Some(v)) => v.clone(),
        _ => p.volume.iter().map(|v| v / shares).collect(),
    };
    insert_turnover(cols, daily, |name| stale.iter().any(|s| *s == name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    fn column(set: &IndicatorSet, name: &str) -> Vec<f64> {
        set.get(name).unwrap().iter().map(|v| v.unwrap()).collect()
    }

    fn record(fields: &[(&str, f64)]) -> Record {
        fields.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn estimated_from_prices_without_statements() {
        let p = test_prices(40);
        let set = compute(&p, &Financials::default());
        assert_eq!(set.names(), COLUMNS.map(String::from));

        let shares = p.volume.iter().mean() * 50.0;
        let cap = column(&set, "MarketCap");
        assert!((cap[7] - p.close[7] * shares).abs() < 1e-3);
        // no full 20-row window yet: zero volatility, neutral liquidity
        assert_eq!(column(&set, "PriceToBookRatio")[0], 1.0);
        assert_eq!(column(&set, "CurrentRatio")[0], 1.5);
        assert!(column(&set, "PERatio").iter().all(|v| (5.0..=50.0).contains(v)));

        let daily = column(&set, "DailyTurnover");
        assert_eq!(column(&set, "turnover_c1d"), daily);
        let m5 = column(&set, "turnover_m5d");
        assert!((m5[2] - (daily[0] + daily[1] + daily[2]) / 3.0).abs() < 1e-12);
        let c5 = column(&set, "turnover_c5d");
        assert!((c5[10] - daily[6..=10].iter().sum::<f64>()).abs() < 1e-12);
    }

    #[test]
    fn reported_figures_take_precedence() {
        let p = test_prices(30);
        let fin = Financials {
            info: Some(record(&[
                ("marketCap", 5e9),
                ("trailingPE", 22.0),
                ("returnOnEquity", 0.2),
                ("floatShares", 1e6),
            ])),
            balance_sheet: Some(record(&[
                ("Total Current Assets", 300.0),
                ("Total Current Liabilities", 200.0),
            ])),
        };
        let set = compute(&p, &fin);
        assert!(column(&set, "MarketCap").iter().all(|v| *v == 5e9));
        assert_eq!(column(&set, "PERatio")[29], 22.0);
        assert_eq!(column(&set, "ROE")[0], 0.2);
        assert_eq!(column(&set, "CurrentRatio")[0], 1.5);
        assert!((column(&set, "QuickRatio")[0] - 1.2).abs() < 1e-12);
        // not reported: fixed defaults
        assert_eq!(column(&set, "PriceToBookRatio")[0], 1.5);
        assert_eq!(column(&set, "TobinsQ")[0], 1.0);
        assert_eq!(column(&set, "ROA")[0], 0.05);
        let daily = column(&set, "DailyTurnover");
        assert_eq!(daily[3], p.volume[3] / 1e6);
    }

    #[test]
    fn reported_without_share_count_estimates_turnover() {
        let p = test_prices(25);
        let fin = Financials {
            info: Some(record(&[("trailingPE", 30.0)])),
            balance_sheet: None,
        };
        let set = compute(&p, &fin);
        let shares = p.volume.iter().mean() * 50.0;
        assert!((column(&set, "DailyTurnover")[0] - p.volume[0] / shares).abs() < 1e-15);
        assert!((column(&set, "MarketCap")[0] - p.close[0] * shares).abs() < 1e-3);
        assert_eq!(column(&set, "DebtToEquity")[0], 0.5);
    }

    #[test]
    fn empty_prices_keep_the_column_list() {
        let set = compute(&PriceTable::empty("X"), &Financials::default());
        assert_eq!(set.len(), 21);
        assert!(set.get("CurrentRatio").unwrap().is_empty());
    }
}
