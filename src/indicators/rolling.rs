//! Window arithmetic shared by the indicator families.
//!
//! Every helper returns one value per input row. `None` marks rows where the
//! window is not yet full; helpers never panic on empty input.

use statrs::statistics::Statistics;
use ta::{Close, High, Low, Next, Open, Volume};
use tracing::debug;

use crate::table::PriceTable;

pub const TRADING_DAYS: f64 = 252.0;

/// Guard added to denominators that may legitimately be zero.
pub const EPS: f64 = 1e-12;

/// One OHLCV row in the shape `ta` indicators consume.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Open for Bar {
    fn open(&self) -> f64 {
        self.open
    }
}

impl High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

impl Volume for Bar {
    fn volume(&self) -> f64 {
        self.volume
    }
}

pub fn bars(prices: &PriceTable) -> Vec<Bar> {
    (0..prices.len())
        .map(|i| Bar {
            open: prices.open[i],
            high: prices.high[i],
            low: prices.low[i],
            close: prices.close[i],
            volume: prices.volume[i],
        })
        .collect()
}

/// Per-session VWAP from daily bars: close * volume / volume, which is the
/// close itself, or 0.0 on a day without volume.
pub fn session_vwap(prices: &PriceTable) -> Vec<f64> {
    prices
        .close
        .iter()
        .zip(&prices.volume)
        .map(|(c, v)| safe_div(c * v, *v))
        .collect()
}

/// Feed `inputs` through a `ta` indicator and blank the first `warmup` rows.
pub fn ta_series<I, T>(indicator: ta::errors::Result<I>, inputs: Vec<T>, warmup: usize) -> Vec<Option<f64>>
where
    I: Next<T, Output = f64>,
{
    let n = inputs.len();
    match indicator {
        Ok(mut ind) => inputs
            .into_iter()
            .enumerate()
            .map(|(i, x)| {
                let v = ind.next(x);
                (i >= warmup).then_some(v)
            })
            .collect(),
        Err(e) => {
            debug!("indicator setup failed: {:?}", e);
            vec![None; n]
        }
    }
}

/// `ta` exponential moving average over the whole series, seeded with the first value.
pub fn ema(x: &[f64], period: usize) -> Vec<f64> {
    match ta::indicators::ExponentialMovingAverage::new(period) {
        Ok(mut ind) => x.iter().map(|&v| ind.next(v)).collect(),
        Err(_) => vec![f64::NAN; x.len()],
    }
}

pub fn mask(values: Vec<f64>, warmup: usize) -> Vec<Option<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i >= warmup).then_some(v))
        .collect()
}

/// Mean over full windows of an optional series; any gap in the window yields `None`.
pub fn rolling_mean_opt(x: &[Option<f64>], w: usize) -> Vec<Option<f64>> {
    rolling_opt(x, w, |s| Some(s.mean()))
}

/// Sample (n-1) standard deviation over full windows of an optional series.
pub fn rolling_sample_std_opt(x: &[Option<f64>], w: usize) -> Vec<Option<f64>> {
    rolling_opt(x, w, sample_std)
}

/// `f` over each full window `x[i+1-w..=i]`.
pub fn rolling_apply(x: &[f64], w: usize, f: impl Fn(&[f64]) -> Option<f64>) -> Vec<Option<f64>> {
    let mut out = vec![None; x.len()];
    if w == 0 {
        return out;
    }
    for i in 0..x.len() {
        if i + 1 >= w {
            out[i] = f(&x[i + 1 - w..=i]);
        }
    }
    out
}

/// `f` over each window truncated at the series start, so row 0 sees one value.
pub fn rolling_partial(x: &[f64], w: usize, f: impl Fn(&[f64]) -> Option<f64>) -> Vec<Option<f64>> {
    if w == 0 {
        return vec![None; x.len()];
    }
    (0..x.len())
        .map(|i| f(&x[(i + 1).saturating_sub(w)..=i]))
        .collect()
}

fn rolling_opt(x: &[Option<f64>], w: usize, f: impl Fn(&[f64]) -> Option<f64>) -> Vec<Option<f64>> {
    let mut out = vec![None; x.len()];
    if w == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(w);
    for i in 0..x.len() {
        if i + 1 < w {
            continue;
        }
        buf.clear();
        buf.extend(x[i + 1 - w..=i].iter().map_while(|v| *v));
        if buf.len() == w {
            out[i] = f(&buf);
        }
    }
    out
}

pub fn sample_std(s: &[f64]) -> Option<f64> {
    (s.len() > 1).then(|| s.std_dev())
}

pub fn window_max(s: &[f64]) -> Option<f64> {
    s.iter().copied().reduce(f64::max)
}

pub fn window_min(s: &[f64]) -> Option<f64> {
    s.iter().copied().reduce(f64::min)
}

/// Offset of the first maximum inside `s`.
pub fn argmax(s: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in s.iter().enumerate() {
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

pub fn argmin(s: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in s.iter().enumerate() {
        if best.is_none_or(|(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Linear-interpolated quantile, `q` in [0, 1].
pub fn quantile(s: &[f64], q: f64) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let mut sorted = s.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Percentile rank of the last value within `s`; ties take their average rank.
pub fn last_pct_rank(s: &[f64]) -> Option<f64> {
    let last = *s.last()?;
    let less = s.iter().filter(|&&v| v < last).count() as f64;
    let equal = s.iter().filter(|&&v| v == last).count() as f64;
    Some((less + (equal + 1.0) / 2.0) / s.len() as f64)
}

/// Least-squares `(slope, intercept)` of `y` against `0..n`.
pub fn linreg(y: &[f64]) -> Option<(f64, f64)> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = y.mean();
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &v) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (v - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Pearson correlation; `None` if either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = x.mean();
    let my = y.mean();
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

pub fn diff(x: &[f64]) -> Vec<Option<f64>> {
    (0..x.len())
        .map(|i| i.checked_sub(1).map(|j| x[i] - x[j]))
        .collect()
}

/// `a / b`, or 0.0 when `b` is (nearly) zero.
pub fn safe_div(a: f64, b: f64) -> f64 {
    if b.abs() > EPS { a / b } else { 0.0 }
}

pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .abs()
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Wilder running sum: seeded with the plain sum of `x[1..=n]`, then
/// `s = s - s / n + x[i]`. Row 0 never contributes.
pub fn wilder_sum(x: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; x.len()];
    if n == 0 || x.len() <= n {
        return out;
    }
    let mut s: f64 = x[1..=n].iter().sum();
    out[n] = Some(s);
    for i in n + 1..x.len() {
        s = s - s / n as f64 + x[i];
        out[i] = Some(s);
    }
    out
}

pub fn zip_map(
    a: &[Option<f64>],
    b: &[Option<f64>],
    f: impl Fn(f64, f64) -> f64,
) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|(x, y)| Some(f((*x)?, (*y)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn full_and_partial_windows() {
        let full = rolling_apply(&[1.0, 2.0, 3.0, 4.0], 2, |s| Some(s.mean()));
        assert_eq!(full, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
        assert!(rolling_apply(&[], 3, |s| Some(s.mean())).is_empty());
        let partial = rolling_partial(&[1.0, 3.0, 5.0], 2, |s| Some(s.mean()));
        assert_eq!(partial, vec![Some(1.0), Some(2.0), Some(4.0)]);
    }

    #[test]
    fn optional_windows_skip_gaps() {
        let x = [None, Some(1.0), Some(3.0), Some(5.0)];
        let m = rolling_mean_opt(&x, 2);
        assert_eq!(m, vec![None, None, Some(2.0), Some(4.0)]);
        let s = rolling_sample_std_opt(&x, 3);
        assert!(approx(s[3], 2.0));
        assert_eq!(s[2], None);
    }

    #[test]
    fn regression_and_correlation() {
        let (slope, intercept) = linreg(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-12 && (intercept - 1.0).abs() < 1e-12);
        assert!(linreg(&[1.0]).is_none());
        assert!(approx(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0));
        assert!(pearson(&[1.0, 1.0, 1.0], &[2.0, 4.0, 6.0]).is_none());
    }

    #[test]
    fn order_statistics() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmin(&[2.0, 1.0, 1.0]), Some(1));
        assert!(approx(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.8), 4.2));
        assert!(approx(last_pct_rank(&[3.0, 1.0, 2.0]), 2.0 / 3.0));
        assert!(approx(last_pct_rank(&[1.0, 1.0]), 0.75));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn differences_and_division() {
        assert_eq!(diff(&[1.0, 4.0]), vec![None, Some(3.0)]);
        assert_eq!(safe_div(1.0, 0.0), 0.0);
        assert_eq!(safe_div(1.0, 4.0), 0.25);
    }

    #[test]
    fn wilder_smoothing_seed() {
        let w = wilder_sum(&[9.0, 1.0, 2.0, 3.0], 2);
        assert_eq!(w[..2], [None, None]);
        assert!(approx(w[2], 3.0));
        assert!(approx(w[3], 3.0 - 1.5 + 3.0));
    }

    #[test]
    fn ta_series_masks_warmup() {
        let sma = ta::indicators::SimpleMovingAverage::new(2);
        let v = ta_series(sma, vec![1.0, 3.0, 5.0], 1);
        assert_eq!(v, vec![None, Some(2.0), Some(4.0)]);
    }
}
