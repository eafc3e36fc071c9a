use ta::Next;
use ta::indicators::{AverageTrueRange, BollingerBands, TrueRange};

use super::IndicatorSet;
use super::rolling::{TRADING_DAYS, bars, diff, rolling_sample_std_opt, safe_div, ta_series};
use crate::table::PriceTable;

const BB_PERIOD: usize = 20;
const ATR_PERIOD: usize = 14;
const REALIZED_WINDOW: usize = 20;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let mut set = IndicatorSet::new();

    let (upper, middle, lower) = bollinger(&p.close);
    set.insert("BB_Upper", upper);
    set.insert("BB_Middle", middle);
    set.insert("BB_Lower", lower);

    let bars = bars(p);
    let atr = ta_series(AverageTrueRange::new(ATR_PERIOD), bars.iter().collect(), ATR_PERIOD);
    let natr = atr
        .iter()
        .zip(&p.close)
        .map(|(a, c)| a.map(|a| safe_div(a, *c) * 100.0))
        .collect();
    set.insert("ATR_14", atr);
    set.insert("NATR_14", natr);
    set.insert("TRANGE", ta_series(Ok(TrueRange::new()), bars.iter().collect(), 1));

    let annual = TRADING_DAYS.sqrt();
    let annualised = |v: Vec<Option<f64>>| v.into_iter().map(|x| x.map(|x| x * annual)).collect::<Vec<_>>();

    let price_diff = diff(&p.close);
    let log_returns: Vec<Option<f64>> = (0..p.len())
        .map(|i| {
            let prev = *p.close.get(i.checked_sub(1)?)?;
            let r = (p.close[i] / prev).ln();
            r.is_finite().then_some(r)
        })
        .collect();

    set.insert(
        "RealizedVolatility_20",
        annualised(rolling_sample_std_opt(&price_diff, REALIZED_WINDOW)),
    );
    set.insert(
        "NegativeSemiDeviation_20",
        annualised(semi_deviation(&price_diff, REALIZED_WINDOW, |d| d < 0.0)),
    );
    set.insert(
        "ContinuousVolatility_20",
        annualised(rolling_sample_std_opt(&log_returns, REALIZED_WINDOW)),
    );
    set.insert(
        "PositiveSemiDeviation_20",
        annualised(semi_deviation(&price_diff, REALIZED_WINDOW, |d| d > 0.0)),
    );
    for w in [10, 30, 60] {
        set.insert(
            format!("Volatility_{}", w),
            annualised(rolling_sample_std_opt(&price_diff, w)),
        );
    }

    set
}

fn bollinger(close: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    let Ok(mut bb) = BollingerBands::new(BB_PERIOD, 2.0) else {
        return (vec![None; n], vec![None; n], vec![None; n]);
    };
    let mut upper = Vec::with_capacity(n);
    let mut middle = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    for (i, &c) in close.iter().enumerate() {
        let o = bb.next(c);
        let ready = i + 1 >= BB_PERIOD;
        upper.push(ready.then_some(o.upper));
        middle.push(ready.then_some(o.average));
        lower.push(ready.then_some(o.lower));
    }
    (upper, middle, lower)
}

/// Rolling sample std over only the changes matching `keep`, taken as their
/// own consecutive series; rows with other changes stay empty.
fn semi_deviation(
    changes: &[Option<f64>],
    w: usize,
    keep: impl Fn(f64) -> bool,
) -> Vec<Option<f64>> {
    let picked: Vec<(usize, f64)> = changes
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.filter(|d| keep(*d)).map(|d| (i, d)))
        .collect();
    let values: Vec<Option<f64>> = picked.iter().map(|(_, d)| Some(*d)).collect();
    let stds = rolling_sample_std_opt(&values, w);

    let mut out = vec![None; changes.len()];
    for ((i, _), s) in picked.iter().zip(stds) {
        out[*i] = s;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    #[test]
    fn column_set_and_warmups() {
        let p = test_prices(80);
        let set = compute(&p);
        assert_eq!(set.len(), 13);
        let bb = set.get("BB_Middle").unwrap();
        assert!(bb[18].is_none() && bb[19].is_some());
        let rv = set.get("RealizedVolatility_20").unwrap();
        assert!(rv[19].is_none() && rv[20].is_some());
        assert!(set.get("Volatility_60").unwrap()[60].is_some());
        assert!(set.get("TRANGE").unwrap()[0].is_none());
    }

    #[test]
    fn bollinger_bands_are_ordered() {
        let set = compute(&test_prices(60));
        let (u, m, l) = (
            set.get("BB_Upper").unwrap(),
            set.get("BB_Middle").unwrap(),
            set.get("BB_Lower").unwrap(),
        );
        for i in 19..60 {
            assert!(u[i].unwrap() >= m[i].unwrap() && m[i].unwrap() >= l[i].unwrap());
        }
    }

    #[test]
    fn semi_deviation_only_on_matching_rows() {
        let changes: Vec<Option<f64>> = std::iter::once(None)
            .chain((1..=6).map(|i| Some(if i % 2 == 0 { -(i as f64) } else { i as f64 })))
            .collect();
        let neg = semi_deviation(&changes, 2, |d| d < 0.0);
        // negatives sit at rows 2, 4, 6
        assert_eq!(neg[1], None);
        assert_eq!(neg[2], None);
        assert!((neg[4].unwrap() - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert!(neg[5].is_none());
        assert!(neg[6].is_some());
    }

    #[test]
    fn empty_input() {
        assert_eq!(compute(&PriceTable::empty("X")).len(), 13);
    }
}
