//! The Alpha158 factor block: K-bar shape, same-day price ratios and 29
//! rolling operators over five windows, every price normalised by close.

use statrs::statistics::Statistics;

use super::IndicatorSet;
use super::rolling::{
    EPS, argmax, argmin, last_pct_rank, linreg, pearson, quantile, rolling_apply, rolling_partial,
    safe_div, session_vwap, window_max, window_min,
};
use crate::table::PriceTable;

pub const WINDOWS: [usize; 5] = [5, 10, 20, 30, 60];

const PREFIX: &str = "ALPHA158_";

/// Correlations are skipped when either side is flatter than this.
const FLAT_STD: f64 = 1e-8;

struct Inputs<'a> {
    open: &'a [f64],
    high: &'a [f64],
    low: &'a [f64],
    close: &'a [f64],
    volume: &'a [f64],
    vwap: Vec<f64>,
}

impl Inputs<'_> {
    fn len(&self) -> usize {
        self.close.len()
    }

    /// `values[i] / close[i]` for every row that has a value.
    fn over_close(&self, values: Vec<Option<f64>>) -> Vec<Option<f64>> {
        values
            .into_iter()
            .zip(self.close)
            .map(|(v, c)| v.map(|v| safe_div(v, *c)))
            .collect()
    }

    fn over_volume(&self, values: Vec<Option<f64>>) -> Vec<Option<f64>> {
        values
            .into_iter()
            .zip(self.volume)
            .map(|(v, vol)| v.map(|v| safe_div(v, vol + EPS)))
            .collect()
    }

    /// `f(i)` for rows whose trailing `d`-row window is complete.
    fn full_windows(&self, d: usize, f: impl Fn(usize) -> Option<f64>) -> Vec<Option<f64>> {
        (0..self.len())
            .map(|i| if d > 0 && i + 1 >= d { f(i) } else { None })
            .collect()
    }
}

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let x = Inputs {
        open: &p.open,
        high: &p.high,
        low: &p.low,
        close: &p.close,
        volume: &p.volume,
        vwap: session_vwap(p),
    };
    let mut set = IndicatorSet::new();

    kbar(&x, &mut set);
    let row = |f: &dyn Fn(usize) -> f64| (0..x.len()).map(|i| Some(f(i))).collect::<Vec<_>>();
    set.insert(name("OPEN0"), row(&|i| safe_div(x.open[i], x.close[i])));
    set.insert(name("HIGH0"), row(&|i| safe_div(x.high[i], x.close[i])));
    set.insert(name("LOW0"), row(&|i| safe_div(x.low[i], x.close[i])));
    set.insert(name("VWAP0"), row(&|i| safe_div(x.vwap[i], x.close[i])));
    set.insert(name("VOLUME0"), row(&|i| safe_div(x.volume[i], x.volume[i] + EPS)));

    price_level(&x, &mut set);
    order_statistics(&x, &mut set);
    price_volume(&x, &mut set);
    up_down(&x, &mut set);
    volume_ops(&x, &mut set);

    set
}

fn name(suffix: &str) -> String {
    format!("{}{}", PREFIX, suffix)
}

fn windowed(set: &mut IndicatorSet, op: &str, f: impl Fn(usize) -> Vec<Option<f64>>) {
    for d in WINDOWS {
        set.insert(format!("{}{}{}", PREFIX, op, d), f(d));
    }
}

/// Two operators emitted interleaved per window (`MAX5, MIN5, MAX10, ...`).
fn windowed_pair(
    set: &mut IndicatorSet,
    ops: (&str, &str),
    f: impl Fn(usize) -> (Vec<Option<f64>>, Vec<Option<f64>>),
) {
    for d in WINDOWS {
        let (a, b) = f(d);
        set.insert(format!("{}{}{}", PREFIX, ops.0, d), a);
        set.insert(format!("{}{}{}", PREFIX, ops.1, d), b);
    }
}

fn kbar(x: &Inputs, set: &mut IndicatorSet) {
    let k = |f: &dyn Fn(f64, f64, f64, f64) -> f64| -> Vec<Option<f64>> {
        (0..x.len())
            .map(|i| Some(f(x.open[i], x.high[i], x.low[i], x.close[i])))
            .collect()
    };
    set.insert(name("KMID"), k(&|o, _, _, c| safe_div(c - o, o)));
    set.insert(name("KLEN"), k(&|o, h, l, _| safe_div(h - l, o)));
    set.insert(name("KMID2"), k(&|o, h, l, c| safe_div(c - o, h - l + EPS)));
    set.insert(name("KUP"), k(&|o, h, _, c| safe_div(h - o.max(c), o)));
    set.insert(name("KUP2"), k(&|o, h, l, c| safe_div(h - o.max(c), h - l + EPS)));
    set.insert(name("KLOW"), k(&|o, _, l, c| safe_div(o.min(c) - l, o)));
    set.insert(name("KLOW2"), k(&|o, h, l, c| safe_div(o.min(c) - l, h - l + EPS)));
    set.insert(name("KSFT"), k(&|o, h, l, c| safe_div(2.0 * c - h - l, o)));
    set.insert(name("KSFT2"), k(&|_, h, l, c| safe_div(2.0 * c - h - l, h - l + EPS)));
}

fn partial_std(s: &[f64]) -> Option<f64> {
    Some(if s.len() > 1 { s.std_dev() } else { 0.0 })
}

fn price_level(x: &Inputs, set: &mut IndicatorSet) {
    let close = x.close;
    windowed(set, "ROC", |d| {
        (0..x.len())
            .map(|i| i.checked_sub(d).map(|j| safe_div(close[j], close[i])))
            .collect()
    });
    windowed(set, "MA", |d| x.over_close(rolling_partial(close, d, |s| Some(s.mean()))));
    windowed(set, "STD", |d| x.over_close(rolling_partial(close, d, partial_std)));
    windowed(set, "BETA", |d| {
        x.over_close(rolling_apply(close, d, |s| linreg(s).map(|(slope, _)| slope)))
    });
    windowed(set, "RSQR", |d| {
        rolling_apply(close, d, |s| {
            let idx: Vec<f64> = (0..s.len()).map(|i| i as f64).collect();
            Some(pearson(&idx, s).map_or(0.0, |r| r * r))
        })
    });
    windowed_pair(set, ("MAX", "MIN"), |d| {
        (
            x.over_close(rolling_partial(x.high, d, window_max)),
            x.over_close(rolling_partial(x.low, d, window_min)),
        )
    });
    windowed_pair(set, ("QTLU", "QTLD"), |d| {
        (
            x.over_close(rolling_partial(close, d, |s| quantile(s, 0.8))),
            x.over_close(rolling_partial(close, d, |s| quantile(s, 0.2))),
        )
    });
}

fn order_statistics(x: &Inputs, set: &mut IndicatorSet) {
    let close = x.close;
    windowed(set, "RANK", |d| rolling_partial(close, d, last_pct_rank));
    windowed(set, "RSV", |d| {
        let lo = rolling_partial(x.low, d, window_min);
        let hi = rolling_partial(x.high, d, window_max);
        (0..x.len())
            .map(|i| {
                let (l, h) = (lo[i]?, hi[i]?);
                Some(safe_div(close[i] - l, h - l + EPS))
            })
            .collect()
    });
    windowed(set, "RESI", |d| {
        x.over_close(rolling_apply(close, d, |s| {
            let (slope, icpt) = linreg(s)?;
            let last = *s.last()?;
            Some(last - (icpt + slope * (s.len() - 1) as f64))
        }))
    });

    // bars since the extreme, as a fraction of the window
    let since = |s: &[f64], pick: fn(&[f64]) -> Option<usize>| pick(s).map(|j| (s.len() - 1 - j) as f64);
    windowed(set, "IMAX", |d| {
        rolling_apply(x.high, d, |s| since(s, argmax).map(|v| v / d as f64))
    });
    windowed(set, "IMIN", |d| {
        rolling_apply(x.low, d, |s| since(s, argmin).map(|v| v / d as f64))
    });
    windowed(set, "IMXD", |d| {
        x.full_windows(d, |i| {
            let r = i + 1 - d..=i;
            let hi = since(&x.high[r.clone()], argmax)?;
            let lo = since(&x.low[r], argmin)?;
            Some((hi - lo) / d as f64)
        })
    });
}

/// Correlation that reads as zero when either input is effectively flat.
fn guarded_corr(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || a.population_std_dev() <= FLAT_STD || b.population_std_dev() <= FLAT_STD {
        return 0.0;
    }
    pearson(a, b).unwrap_or(0.0)
}

fn price_volume(x: &Inputs, set: &mut IndicatorSet) {
    let (close, volume) = (x.close, x.volume);
    windowed(set, "CORR", |d| {
        x.full_windows(d, |i| {
            let r = i + 1 - d..=i;
            let log_vol: Vec<f64> = volume[r.clone()].iter().map(|v| (v + 1.0).ln()).collect();
            Some(guarded_corr(&close[r], &log_vol))
        })
    });
    windowed(set, "CORD", |d| {
        x.full_windows(d, |i| {
            let steps = i + 2 - d..=i;
            let price: Vec<f64> = steps.clone().map(|j| close[j] / close[j - 1]).collect();
            let vol: Vec<f64> = steps
                .map(|j| (volume[j] / (volume[j - 1] + EPS) + 1.0).ln())
                .collect();
            Some(guarded_corr(&price, &vol))
        })
    });
}

/// One-step changes of `series` inside the `d`-row window ending at `i`.
fn changes(series: &[f64], d: usize, i: usize) -> Vec<f64> {
    (i + 2 - d..=i).map(|j| series[j] - series[j - 1]).collect()
}

struct Balance {
    up: f64,
    down: f64,
    total: f64,
}

impl Balance {
    fn of(changes: &[f64]) -> Self {
        Balance {
            up: changes.iter().map(|c| c.max(0.0)).sum(),
            down: changes.iter().map(|c| (-c).max(0.0)).sum(),
            total: changes.iter().map(|c| c.abs()).sum(),
        }
    }
}

fn up_down(x: &Inputs, set: &mut IndicatorSet) {
    let close = x.close;
    let share = |d: usize, keep: fn(f64) -> bool| {
        x.full_windows(d, move |i| {
            let c = changes(close, d, i);
            (!c.is_empty()).then(|| c.iter().filter(|v| keep(**v)).count() as f64 / c.len() as f64)
        })
    };
    windowed(set, "CNTP", |d| share(d, |c| c > 0.0));
    windowed(set, "CNTN", |d| share(d, |c| c < 0.0));
    windowed(set, "CNTD", |d| {
        x.full_windows(d, |i| {
            let c = changes(close, d, i);
            if c.is_empty() {
                return None;
            }
            let up = c.iter().filter(|v| **v > 0.0).count() as f64;
            let down = c.iter().filter(|v| **v < 0.0).count() as f64;
            Some((up - down) / c.len() as f64)
        })
    });
    balance_ops(x, set, close, ("SUMP", "SUMN", "SUMD"));
}

fn balance_ops(x: &Inputs, set: &mut IndicatorSet, series: &[f64], ops: (&str, &str, &str)) {
    let ratio = |d: usize, f: fn(&Balance) -> f64| {
        x.full_windows(d, move |i| {
            let b = Balance::of(&changes(series, d, i));
            Some(safe_div(f(&b), b.total + EPS))
        })
    };
    windowed(set, ops.0, |d| ratio(d, |b| b.up));
    windowed(set, ops.1, |d| ratio(d, |b| b.down));
    windowed(set, ops.2, |d| ratio(d, |b| b.up - b.down));
}

fn volume_ops(x: &Inputs, set: &mut IndicatorSet) {
    let (close, volume) = (x.close, x.volume);
    windowed(set, "VMA", |d| x.over_volume(rolling_partial(volume, d, |s| Some(s.mean()))));
    windowed(set, "VSTD", |d| x.over_volume(rolling_partial(volume, d, partial_std)));
    windowed(set, "WVMA", |d| {
        x.full_windows(d, |i| {
            let weighted: Vec<f64> = (i + 2 - d..=i)
                .map(|j| (close[j] / close[j - 1] - 1.0).abs() * volume[j])
                .collect();
            if weighted.is_empty() {
                return None;
            }
            let mean = weighted.iter().sum::<f64>() / weighted.len() as f64;
            let std = (&weighted).population_std_dev();
            Some(safe_div(std, mean + EPS))
        })
    });
    balance_ops(x, set, volume, ("VSUMP", "VSUMN", "VSUMD"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    fn at(set: &IndicatorSet, col: &str, i: usize) -> Option<f64> {
        set.get(col).unwrap()[i]
    }

    #[test]
    fn block_order_with_volume_ratio() {
        let set = compute(&test_prices(80));
        assert_eq!(set.len(), 159);
        let names = set.names();
        assert_eq!(names[0], "ALPHA158_KMID");
        assert_eq!(names[12], "ALPHA158_VWAP0");
        assert_eq!(names[13], "ALPHA158_VOLUME0");
        assert_eq!(names[14], "ALPHA158_ROC5");
        assert_eq!(names.last().map(String::as_str), Some("ALPHA158_VSUMD60"));
        let max5 = names.iter().position(|n| n == "ALPHA158_MAX5").unwrap();
        assert_eq!(names[max5 + 1], "ALPHA158_MIN5");
    }

    #[test]
    fn vwap_is_the_close_except_on_idle_days() {
        let mut p = test_prices(3);
        p.volume = vec![1000.0, 0.0, 500.0];
        let set = compute(&p);
        assert!((at(&set, "ALPHA158_VWAP0", 0).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(at(&set, "ALPHA158_VWAP0", 1), Some(0.0));
        assert_eq!(at(&set, "ALPHA158_VOLUME0", 1), Some(0.0));
        assert!((at(&set, "ALPHA158_VOLUME0", 2).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kbar_on_a_known_candle() {
        let mut p = test_prices(1);
        p.open = vec![10.0];
        p.high = vec![12.0];
        p.low = vec![9.0];
        p.close = vec![11.0];
        let set = compute(&p);
        assert!((at(&set, "ALPHA158_KMID", 0).unwrap() - 0.1).abs() < 1e-12);
        assert!((at(&set, "ALPHA158_KLEN", 0).unwrap() - 0.3).abs() < 1e-12);
        assert!((at(&set, "ALPHA158_KSFT", 0).unwrap() - 0.1).abs() < 1e-12);
        assert!((at(&set, "ALPHA158_KUP2", 0).unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn roc_is_lagged_close_over_close() {
        let p = test_prices(70);
        let set = compute(&p);
        assert_eq!(at(&set, "ALPHA158_ROC5", 4), None);
        let v = at(&set, "ALPHA158_ROC5", 10).unwrap();
        assert!((v - p.close[5] / p.close[10]).abs() < 1e-12);
        assert_eq!(at(&set, "ALPHA158_ROC60", 59), None);
        assert!(at(&set, "ALPHA158_ROC60", 60).is_some());
    }

    #[test]
    fn partial_and_full_windows() {
        let set = compute(&test_prices(70));
        // partial windows are defined from row 0
        assert_eq!(at(&set, "ALPHA158_STD20", 0), Some(0.0));
        assert!(at(&set, "ALPHA158_MA60", 0).is_some());
        assert!(at(&set, "ALPHA158_RANK10", 0).is_some());
        // full-window operators start once the window fills
        assert_eq!(at(&set, "ALPHA158_BETA10", 8), None);
        assert!(at(&set, "ALPHA158_BETA10", 9).is_some());
        assert!(at(&set, "ALPHA158_CORD5", 4).is_some());
        assert_eq!(at(&set, "ALPHA158_WVMA60", 58), None);
    }

    #[test]
    fn rising_close_counts() {
        let mut p = test_prices(12);
        p.close = (0..12).map(|i| 10.0 + i as f64).collect();
        let set = compute(&p);
        assert_eq!(at(&set, "ALPHA158_CNTP5", 11), Some(1.0));
        assert_eq!(at(&set, "ALPHA158_CNTN5", 11), Some(0.0));
        assert!((at(&set, "ALPHA158_SUMP5", 11).unwrap() - 1.0).abs() < 1e-9);
        assert!((at(&set, "ALPHA158_RSQR10", 11).unwrap() - 1.0).abs() < 1e-9);
        assert!(at(&set, "ALPHA158_RESI10", 11).unwrap().abs() < 1e-9);
        assert_eq!(at(&set, "ALPHA158_RANK5", 11), Some(1.0));
    }

    #[test]
    fn flat_volume_gives_zero_correlation() {
        let mut p = test_prices(20);
        p.volume = vec![1000.0; 20];
        let set = compute(&p);
        assert_eq!(at(&set, "ALPHA158_CORR5", 10), Some(0.0));
    }
}
