use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage};
use ta::Next;

use super::IndicatorSet;
use super::rolling::{argmax, argmin, ema, mask, safe_div, ta_series, true_range, wilder_sum, zip_map};
use crate::table::PriceTable;

const DM_PERIOD: usize = 14;
const AROON_PERIOD: usize = 14;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let close = &p.close;
    let mut set = IndicatorSet::new();

    for n in [5, 10, 20, 50] {
        set.insert(format!("SMA_{}", n), ta_series(SimpleMovingAverage::new(n), close.clone(), n - 1));
    }
    for n in [5, 10, 20, 50] {
        set.insert(format!("EMA_{}", n), mask(ema(close, n), n - 1));
    }

    let e1 = ema(close, 20);
    let e2 = ema(&e1, 20);
    let e3 = ema(&e2, 20);
    let dema: Vec<f64> = e1.iter().zip(&e2).map(|(a, b)| 2.0 * a - b).collect();
    let tema: Vec<f64> = (0..close.len()).map(|i| 3.0 * e1[i] - 3.0 * e2[i] + e3[i]).collect();
    set.insert("DEMA_20", mask(dema, 2 * 19));
    set.insert("TEMA_20", mask(tema, 3 * 19));
    set.insert("WMA_20", wma(close, 20));
    set.insert("KAMA_30", kama(close, 30));

    let (macd, signal, hist) = macd(close);
    set.insert("MACD", macd);
    set.insert("MACD_Signal", signal);
    set.insert("MACD_Histogram", hist);

    let sma = |n: usize| ta_series(SimpleMovingAverage::new(n), close.clone(), n - 1);
    set.insert("MACDEXT", zip_map(&sma(12), &sma(26), |f, s| f - s));
    let fix: Vec<f64> = ema_k(close, 0.15)
        .iter()
        .zip(ema_k(close, 0.075))
        .map(|(f, s)| f - s)
        .collect();
    set.insert("MACDFIX", mask(fix, 25));

    let fast = ema(close, 12);
    let slow = ema(close, 26);
    let apo: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let ppo: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| safe_div(f - s, *s) * 100.0).collect();
    set.insert("APO", mask(apo, 25));
    set.insert("PPO", mask(ppo, 25));
    set.insert("TRIX_30", trix(close, 30));

    let (down, up) = aroon(&p.high, &p.low, AROON_PERIOD);
    set.insert("AROONOSC_14", zip_map(&up, &down, |u, d| u - d));
    set.insert("AROON_DOWN", down);
    set.insert("AROON_UP", up);

    let dm = directional(p, DM_PERIOD);
    set.insert("PLUS_DM_14", dm.plus_dm);
    set.insert("MINUS_DM_14", dm.minus_dm);
    set.insert("PLUS_DI_14", dm.plus_di);
    set.insert("MINUS_DI_14", dm.minus_di);
    set.insert("DX_14", dm.dx);
    set.insert("ADXR_14", adxr(&dm.adx, DM_PERIOD));
    set.insert("ADX_14", dm.adx);

    set
}

fn wma(x: &[f64], n: usize) -> Vec<Option<f64>> {
    let denom = (n * (n + 1) / 2) as f64;
    super::rolling::rolling_apply(x, n, |s| {
        Some(s.iter().enumerate().map(|(i, v)| (i + 1) as f64 * v).sum::<f64>() / denom)
    })
}

/// Kaufman adaptive moving average, fast 2 / slow `n`.
fn kama(x: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; x.len()];
    if x.len() <= n {
        return out;
    }
    let fast = 2.0 / 3.0;
    let slow = 2.0 / (n as f64 + 1.0);
    let mut prev = x[n - 1];
    for i in n..x.len() {
        let change = (x[i] - x[i - n]).abs();
        let volatility: f64 = (i - n + 1..=i).map(|j| (x[j] - x[j - 1]).abs()).sum();
        let er = safe_div(change, volatility);
        let sc = (er * (fast - slow) + slow).powi(2);
        prev += sc * (x[i] - prev);
        out[i] = Some(prev);
    }
    out
}

fn macd(close: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    let Ok(mut ind) = MovingAverageConvergenceDivergence::new(12, 26, 9) else {
        return (vec![None; n], vec![None; n], vec![None; n]);
    };
    let warmup = 25;
    let signal_warmup = 25 + 8;
    let mut macd = Vec::with_capacity(n);
    let mut signal = Vec::with_capacity(n);
    let mut hist = Vec::with_capacity(n);
    for (i, &c) in close.iter().enumerate() {
        let o = ind.next(c);
        macd.push((i >= warmup).then_some(o.macd));
        signal.push((i >= signal_warmup).then_some(o.signal));
        hist.push((i >= signal_warmup).then_some(o.histogram));
    }
    (macd, signal, hist)
}

/// EMA with a fixed smoothing factor, seeded with the first value.
fn ema_k(x: &[f64], k: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    let mut prev = None;
    for &v in x {
        let next = prev.map_or(v, |p: f64| p + k * (v - p));
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Average of today's ADX and the ADX `n - 1` rows back.
fn adxr(adx: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    (0..adx.len())
        .map(|i| {
            let back = adx[i.checked_sub(n - 1)?]?;
            Some((adx[i]? + back) / 2.0)
        })
        .collect()
}

/// One-day percent change of the triple-smoothed EMA.
fn trix(x: &[f64], n: usize) -> Vec<Option<f64>> {
    let e3 = ema(&ema(&ema(x, n), n), n);
    let warmup = 3 * (n - 1) + 1;
    (0..x.len())
        .map(|i| (i >= warmup).then(|| safe_div(e3[i] - e3[i - 1], e3[i - 1]) * 100.0))
        .collect()
}

/// Aroon down/up over `n + 1` bars.
fn aroon(high: &[f64], low: &[f64], n: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let len = high.len();
    let mut down = vec![None; len];
    let mut up = vec![None; len];
    for i in n..len {
        let w = i - n..=i;
        // latest extreme wins ties
        let since_high = high[w.clone()].iter().rev().copied().collect::<Vec<_>>();
        let since_low = low[w].iter().rev().copied().collect::<Vec<_>>();
        if let (Some(h), Some(l)) = (argmax(&since_high), argmin(&since_low)) {
            up[i] = Some(100.0 * (n - h) as f64 / n as f64);
            down[i] = Some(100.0 * (n - l) as f64 / n as f64);
        }
    }
    (down, up)
}

struct Directional {
    plus_dm: Vec<Option<f64>>,
    minus_dm: Vec<Option<f64>>,
    plus_di: Vec<Option<f64>>,
    minus_di: Vec<Option<f64>>,
    dx: Vec<Option<f64>>,
    adx: Vec<Option<f64>>,
}

/// Wilder's directional movement system.
fn directional(p: &PriceTable, n: usize) -> Directional {
    let len = p.len();
    let mut plus = vec![0.0; len];
    let mut minus = vec![0.0; len];
    let mut tr = vec![0.0; len];
    for i in 1..len {
        let up = p.high[i] - p.high[i - 1];
        let down = p.low[i - 1] - p.low[i];
        if up > down && up > 0.0 {
            plus[i] = up;
        }
        if down > up && down > 0.0 {
            minus[i] = down;
        }
        tr[i] = true_range(p.high[i], p.low[i], p.close[i - 1]);
    }

    let plus_dm = wilder_sum(&plus, n);
    let minus_dm = wilder_sum(&minus, n);
    let str_ = wilder_sum(&tr, n);
    let plus_di = zip_map(&plus_dm, &str_, |d, t| 100.0 * safe_div(d, t));
    let minus_di = zip_map(&minus_dm, &str_, |d, t| 100.0 * safe_div(d, t));
    let dx = zip_map(&plus_di, &minus_di, |p, m| 100.0 * safe_div((p - m).abs(), p + m));

    let mut adx = vec![None; len];
    let first = 2 * n - 1;
    if n > 0 && len > first {
        let seed: f64 = dx[n..=first].iter().flatten().sum::<f64>() / n as f64;
        let mut prev = seed;
        adx[first] = Some(prev);
        for i in first + 1..len {
            if let Some(d) = dx[i] {
                prev = (prev * (n as f64 - 1.0) + d) / n as f64;
                adx[i] = Some(prev);
            }
        }
    }

    Directional {
        plus_dm,
        minus_dm,
        plus_di,
        minus_di,
        dx,
        adx,
    }
}
