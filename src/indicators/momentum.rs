use ta::indicators::{
    CommodityChannelIndex, FastStochastic, MoneyFlowIndex, RateOfChange, RelativeStrengthIndex,
    SlowStochastic,
};

use super::IndicatorSet;
use super::rolling::{
    bars, rolling_apply, rolling_mean_opt, safe_div, ta_series, window_max, window_min,
};
use crate::table::PriceTable;

const PERIOD: usize = 14;
const ROC_PERIOD: usize = 10;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let close = &p.close;
    let bars = bars(p);
    let bar_refs = || bars.iter().collect::<Vec<_>>();
    let mut set = IndicatorSet::new();

    let rsi = ta_series(RelativeStrengthIndex::new(PERIOD), close.clone(), PERIOD);
    set.insert("RSI_14", rsi.clone());
    set.insert("CCI_14", ta_series(CommodityChannelIndex::new(PERIOD), bar_refs(), PERIOD - 1));
    set.insert("CMO_14", cmo(close, PERIOD));
    set.insert("MFI_14", ta_series(MoneyFlowIndex::new(PERIOD), bar_refs(), PERIOD));
    set.insert("WILLR_14", williams_r(p, PERIOD));
    set.insert("ULTOSC", ultimate_oscillator(p));
    set.insert(
        "BOP",
        (0..p.len())
            .map(|i| Some(safe_div(p.close[i] - p.open[i], p.high[i] - p.low[i])))
            .collect(),
    );

    let n = ROC_PERIOD;
    let lagged = |f: fn(f64, f64) -> f64| -> Vec<Option<f64>> {
        (0..close.len())
            .map(|i| i.checked_sub(n).map(|j| f(close[i], close[j])))
            .collect()
    };
    set.insert("MOM_10", lagged(|c, prev| c - prev));
    set.insert("ROC_10", ta_series(RateOfChange::new(n), close.clone(), n));
    set.insert("ROCP_10", lagged(|c, prev| safe_div(c - prev, prev)));
    set.insert("ROCR_10", lagged(|c, prev| safe_div(c, prev)));
    set.insert("ROCR100_10", lagged(|c, prev| safe_div(c, prev) * 100.0));

    let slow_k = ta_series(SlowStochastic::new(PERIOD, 3), bar_refs(), PERIOD + 1);
    let slow_d = rolling_mean_opt(&slow_k, 3);
    set.insert("STOCH_K", slow_k);
    set.insert("STOCH_D", slow_d);

    let fast_k = ta_series(FastStochastic::new(PERIOD), bar_refs(), PERIOD - 1);
    let fast_d = rolling_mean_opt(&fast_k, 3);
    set.insert("STOCHF_K", fast_k);
    set.insert("STOCHF_D", fast_d);

    // fast stochastic (5) applied to the RSI line once it is defined
    let rsi_values: Vec<f64> = rsi.iter().map(|v| v.unwrap_or(0.0)).collect();
    let stoch_rsi: Vec<Option<f64>> = ta_series(FastStochastic::new(5), rsi_values, 0)
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i >= PERIOD + 4 { v } else { None })
        .collect();
    let stoch_rsi_d = rolling_mean_opt(&stoch_rsi, 3);
    set.insert("STOCHRSI_K", stoch_rsi);
    set.insert("STOCHRSI_D", stoch_rsi_d);

    set
}

/// Chande momentum oscillator over `n` one-day changes.
fn cmo(close: &[f64], n: usize) -> Vec<Option<f64>> {
    let changes: Vec<f64> = (0..close.len())
        .map(|i| if i == 0 { 0.0 } else { close[i] - close[i - 1] })
        .collect();
    let mut out = rolling_apply(&changes, n, |s| {
        let up: f64 = s.iter().filter(|c| **c > 0.0).sum();
        let down: f64 = -s.iter().filter(|c| **c < 0.0).sum::<f64>();
        Some(100.0 * safe_div(up - down, up + down))
    });
    // the first full window would include the artificial row-0 change
    if let Some(first) = out.get_mut(n - 1) {
        *first = None;
    }
    out
}

fn williams_r(p: &PriceTable, n: usize) -> Vec<Option<f64>> {
    let hh = rolling_apply(&p.high, n, window_max);
    let ll = rolling_apply(&p.low, n, window_min);
    (0..p.len())
        .map(|i| {
            let (h, l) = (hh[i]?, ll[i]?);
            Some(-100.0 * safe_div(h - p.close[i], h - l))
        })
        .collect()
}

/// Ultimate oscillator with 7/14/28 day averages weighted 4:2:1.
fn ultimate_oscillator(p: &PriceTable) -> Vec<Option<f64>> {
    let len = p.len();
    let mut bp = vec![0.0; len];
    let mut tr = vec![0.0; len];
    for i in 1..len {
        let prev = p.close[i - 1];
        let true_low = p.low[i].min(prev);
        bp[i] = p.close[i] - true_low;
        tr[i] = p.high[i].max(prev) - true_low;
    }
    let avg = |n: usize, i: usize| -> f64 {
        let b: f64 = bp[i + 1 - n..=i].iter().sum();
        let t: f64 = tr[i + 1 - n..=i].iter().sum();
        safe_div(b, t)
    };
    (0..len)
        .map(|i| (i >= 28).then(|| 100.0 * (4.0 * avg(7, i) + 2.0 * avg(14, i) + avg(28, i)) / 7.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    #[test]
    fn column_set() {
        let set = compute(&test_prices(100));
        assert_eq!(set.len(), 18);
        for name in ["RSI_14", "STOCH_K", "STOCHRSI_D", "ULTOSC", "ROCR100_10"] {
            assert!(set.get(name).unwrap()[99].is_some(), "{}", name);
        }
    }

    #[test]
    fn momentum_and_ratios() {
        let p = test_prices(30);
        let set = compute(&p);
        let mom = set.get("MOM_10").unwrap();
        assert!(mom[9].is_none());
        assert!((mom[10].unwrap() - (p.close[10] - p.close[0])).abs() < 1e-12);
        let rocr = set.get("ROCR100_10").unwrap();
        assert!((rocr[12].unwrap() - 100.0 * p.close[12] / p.close[2]).abs() < 1e-9);
    }

    #[test]
    fn cmo_of_monotonic_series_is_extreme() {
        let up: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let cmo = cmo(&up, 14);
        assert_eq!(cmo[13], None);
        assert_eq!(cmo[14], Some(100.0));
    }

    #[test]
    fn williams_r_bounds() {
        let set = compute(&test_prices(60));
        for v in set.get("WILLR_14").unwrap().iter().flatten() {
            assert!((-100.0..=0.0).contains(v));
        }
    }

    #[test]
    fn empty_input() {
        assert_eq!(compute(&PriceTable::empty("X")).len(), 18);
    }
}
