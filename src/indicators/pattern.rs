//! Candlestick pattern flags: +100 bullish, -100 bearish, 0 absent.
//!
//! Shapes are judged from body/shadow proportions of the candle's own range;
//! trend context is the close five sessions before the prior candle. Size
//! comparisons against "typical" candles use the ten sessions before the
//! current one.

use super::IndicatorSet;
use crate::table::PriceTable;

const TREND_LOOKBACK: usize = 5;
const AVERAGE_PERIOD: usize = 10;
/// Prices within this share of the typical range count as equal.
const NEAR: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Candle {
    fn range(&self) -> f64 {
        self.high - self.low
    }
    fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
    fn top(&self) -> f64 {
        self.open.max(self.close)
    }
    fn bottom(&self) -> f64 {
        self.open.min(self.close)
    }
    fn upper_shadow(&self) -> f64 {
        self.high - self.top()
    }
    fn lower_shadow(&self) -> f64 {
        self.bottom() - self.low
    }
    fn bullish(&self) -> bool {
        self.close > self.open
    }
    fn bearish(&self) -> bool {
        self.close < self.open
    }
    fn mid_body(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
    fn is_doji(&self) -> bool {
        self.range() > 0.0 && self.body() <= 0.1 * self.range()
    }
    fn is_long(&self) -> bool {
        self.range() > 0.0 && self.body() >= 0.6 * self.range()
    }
    fn is_small(&self) -> bool {
        self.range() > 0.0 && self.body() <= 0.3 * self.range()
    }
    fn is_marubozu(&self) -> bool {
        self.is_long() && self.upper_shadow() <= NEAR * self.range() && self.lower_shadow() <= NEAR * self.range()
    }
    fn color(&self) -> f64 {
        if self.bullish() {
            100.0
        } else if self.bearish() {
            -100.0
        } else {
            0.0
        }
    }
    /// Like `color`, but an unchanged candle counts as white.
    fn direction(&self) -> f64 {
        if self.close >= self.open { 100.0 } else { -100.0 }
    }
    /// Body strictly inside `other`'s body.
    fn body_inside(&self, other: &Candle) -> bool {
        self.top() < other.top() && self.bottom() > other.bottom()
    }
    fn gaps_above(&self, prev: &Candle) -> bool {
        self.bottom() > prev.top()
    }
    fn gaps_below(&self, prev: &Candle) -> bool {
        self.top() < prev.bottom()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Trend {
    Up,
    Down,
    Flat,
}

type Rule = fn(&[Candle], usize, Trend) -> f64;

const RULES: [(&str, Rule); 61] = [
    ("CDL2CROWS", two_crows),
    ("CDL3BLACKCROWS", three_black_crows),
    ("CDL3INSIDE", three_inside),
    ("CDL3LINESTRIKE", three_line_strike),
    ("CDL3OUTSIDE", three_outside),
    ("CDL3STARSINSOUTH", three_stars_in_south),
    ("CDL3WHITESOLDIERS", three_white_soldiers),
    ("CDLABANDONEDBABY", abandoned_baby),
    ("CDLADVANCEBLOCK", advance_block),
    ("CDLBELTHOLD", belt_hold),
    ("CDLBREAKAWAY", breakaway),
    ("CDLCLOSINGMARUBOZU", closing_marubozu),
    ("CDLCONCEALBABYSWALL", conceal_baby_swallow),
    ("CDLCOUNTERATTACK", counterattack),
    ("CDLDARKCLOUDCOVER", dark_cloud_cover),
    ("CDLDOJI", doji),
    ("CDLDOJISTAR", doji_star),
    ("CDLDRAGONFLYDOJI", dragonfly_doji),
    ("CDLENGULFING", engulfing),
    ("CDLEVENINGDOJISTAR", evening_doji_star),
    ("CDLEVENINGSTAR", evening_star),
    ("CDLGAPSIDESIDEWHITE", gap_side_side_white),
    ("CDLGRAVESTONEDOJI", gravestone_doji),
    ("CDLHAMMER", hammer),
    ("CDLHANGINGMAN", hanging_man),
    ("CDLHARAMI", harami),
    ("CDLHARAMICROSS", harami_cross),
    ("CDLHIGHWAVE", high_wave),
    ("CDLHIKKAKE", hikkake),
    ("CDLHIKKAKEMOD", hikkake_mod),
    ("CDLHOMINGPIGEON", homing_pigeon),
    ("CDLIDENTICAL3CROWS", identical_three_crows),
    ("CDLINNECK", in_neck),
    ("CDLINVERTEDHAMMER", inverted_hammer),
    ("CDLKICKING", kicking),
    ("CDLKICKINGBYLENGTH", kicking_by_length),
    ("CDLLADDERBOTTOM", ladder_bottom),
    ("CDLLONGLEGGEDDOJI", long_legged_doji),
    ("CDLLONGLINE", long_line),
    ("CDLMARUBOZU", marubozu),
    ("CDLMATCHINGLOW", matching_low),
    ("CDLMATHOLD", mat_hold),
    ("CDLMORNINGDOJISTAR", morning_doji_star),
    ("CDLMORNINGSTAR", morning_star),
    ("CDLONNECK", on_neck),
    ("CDLPIERCING", piercing),
    ("CDLRICKSHAWMAN", rickshaw_man),
    ("CDLRISEFALL3METHODS", rise_fall_three_methods),
    ("CDLSEPARATINGLINES", separating_lines),
    ("CDLSHOOTINGSTAR", shooting_star),
    ("CDLSHORTLINE", short_line),
    ("CDLSPINNINGTOP", spinning_top),
    ("CDLSTALLEDPATTERN", stalled_pattern),
    ("CDLSTICKSANDWICH", stick_sandwich),
    ("CDLTAKURI", takuri),
    ("CDLTASUKIGAP", tasuki_gap),
    ("CDLTHRUSTING", thrusting),
    ("CDLTRISTAR", tristar),
    ("CDLUNIQUE3RIVER", unique_three_river),
    ("CDLUPSIDEGAP2CROWS", upside_gap_two_crows),
    ("CDLXSIDEGAP3METHODS", xside_gap_three_methods),
];

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let candles: Vec<Candle> = (0..p.len())
        .map(|i| Candle {
            open: p.open[i],
            high: p.high[i],
            low: p.low[i],
            close: p.close[i],
        })
        .collect();
    let trends: Vec<Trend> = (0..candles.len()).map(|i| trend_before(&candles, i)).collect();

    let mut set = IndicatorSet::new();
    for (name, rule) in RULES {
        let values = (0..candles.len())
            .map(|i| Some(rule(&candles, i, trends[i])))
            .collect();
        set.insert(name, values);
    }
    set
}

fn trend_before(c: &[Candle], i: usize) -> Trend {
    let Some(start) = i.checked_sub(TREND_LOOKBACK + 1) else {
        return Trend::Flat;
    };
    let (then, prev) = (c[start].close, c[i - 1].close);
    if prev > then {
        Trend::Up
    } else if prev < then {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// The `n` candles ending at `i`, when that many exist.
fn window(c: &[Candle], i: usize, n: usize) -> Option<&[Candle]> {
    let start = (i + 1).checked_sub(n)?;
    c.get(start..=i)
}

/// Mean of `f` over the candles before `i`; the candle itself when there are none.
fn typical(c: &[Candle], i: usize, f: fn(&Candle) -> f64) -> f64 {
    let history = &c[i.saturating_sub(AVERAGE_PERIOD)..i];
    if history.is_empty() {
        return f(&c[i]);
    }
    history.iter().map(f).sum::<f64>() / history.len() as f64
}

fn near(a: f64, b: f64, c: &[Candle], i: usize) -> bool {
    (a - b).abs() <= NEAR * typical(c, i, Candle::range)
}

fn flag(hit: bool, value: f64) -> f64 {
    if hit { value } else { 0.0 }
}

fn two_crows(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        a.bullish()
            && a.is_long()
            && b.bearish()
            && b.gaps_above(&a)
            && d.bearish()
            && d.open < b.open
            && d.open > b.close
            && d.close > a.open
            && d.close < a.close,
        -100.0,
    )
}

fn three_inside(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let harami = a.is_long() && b.body_inside(&a);
    if harami && a.bearish() && b.bullish() && d.close > a.open {
        100.0
    } else if harami && a.bullish() && b.bearish() && d.close < a.open {
        -100.0
    } else {
        0.0
    }
}

fn three_line_strike(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e]) = window(c, i, 4) else { return 0.0 };
    let rising = [a, b, d].iter().all(Candle::bullish) && b.close > a.close && d.close > b.close;
    let falling = [a, b, d].iter().all(Candle::bearish) && b.close < a.close && d.close < b.close;
    if rising && e.bearish() && e.open >= d.close && e.close < a.open {
        100.0
    } else if falling && e.bullish() && e.open <= d.close && e.close > a.open {
        -100.0
    } else {
        0.0
    }
}

fn three_outside(c: &[Candle], i: usize, t: Trend) -> f64 {
    let Some(&[_, b, d]) = window(c, i, 3) else { return 0.0 };
    let engulf = engulfing(c, i - 1, t);
    if engulf > 0.0 && d.close > b.close {
        100.0
    } else if engulf < 0.0 && d.close < b.close {
        -100.0
    } else {
        0.0
    }
}

fn three_stars_in_south(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        a.bearish()
            && a.body() >= 0.4 * a.range()
            && a.lower_shadow() >= 0.3 * a.range()
            && b.bearish()
            && b.body() < a.body()
            && b.open < a.open
            && b.open > a.close
            && b.low > a.low
            && d.bearish()
            && d.upper_shadow() <= NEAR * d.range()
            && d.lower_shadow() <= NEAR * d.range()
            && d.high <= b.high
            && d.low >= b.low,
        100.0,
    )
}

fn abandoned_baby(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    if !a.is_long() || !b.is_doji() {
        return 0.0;
    }
    if a.bearish() && b.high < a.low && d.bullish() && d.low > b.high && d.close > a.close + 0.3 * a.body() {
        100.0
    } else if a.bullish() && b.low > a.high && d.bearish() && d.high < b.low && d.close < a.close - 0.3 * a.body() {
        -100.0
    } else {
        0.0
    }
}

fn advance_block(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let advancing = [a, b, d].iter().all(Candle::bullish)
        && b.close > a.close
        && d.close > b.close
        && b.open > a.open
        && b.open <= a.close
        && d.open > b.open
        && d.open <= b.close;
    let weakening = (d.body() < b.body() && b.body() < a.body()) || d.upper_shadow() > d.body().max(b.upper_shadow());
    flag(advancing && weakening, -100.0)
}

fn belt_hold(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    if !k.is_long() {
        0.0
    } else if k.bullish() && k.lower_shadow() <= NEAR * k.range() {
        100.0
    } else if k.bearish() && k.upper_shadow() <= NEAR * k.range() {
        -100.0
    } else {
        0.0
    }
}

fn breakaway(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e, f]) = window(c, i, 5) else { return 0.0 };
    let bull = a.bearish()
        && a.is_long()
        && b.bearish()
        && b.gaps_below(&a)
        && d.high < b.high
        && d.low < b.low
        && e.bearish()
        && e.high < d.high
        && e.low < d.low
        && f.bullish()
        && f.close > b.open
        && f.close < a.close;
    let bear = a.bullish()
        && a.is_long()
        && b.bullish()
        && b.gaps_above(&a)
        && d.high > b.high
        && d.low > b.low
        && e.bullish()
        && e.high > d.high
        && e.low > d.low
        && f.bearish()
        && f.close < b.open
        && f.close > a.close;
    if bull {
        100.0
    } else if bear {
        -100.0
    } else {
        0.0
    }
}

fn closing_marubozu(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    if !k.is_long() {
        0.0
    } else if k.bullish() && k.upper_shadow() <= NEAR * k.range() {
        100.0
    } else if k.bearish() && k.lower_shadow() <= NEAR * k.range() {
        -100.0
    } else {
        0.0
    }
}

fn conceal_baby_swallow(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e]) = window(c, i, 4) else { return 0.0 };
    flag(
        a.bearish()
            && a.is_marubozu()
            && b.bearish()
            && b.is_marubozu()
            && d.bearish()
            && d.open < b.close
            && d.high > b.close
            && e.bearish()
            && e.open > d.high
            && e.close < d.low,
        100.0,
    )
}

fn counterattack(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(
        a.is_long() && b.is_long() && a.color() != 0.0 && a.color() == -b.color() && near(a.close, b.close, c, i),
        b.color(),
    )
}

fn dark_cloud_cover(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[prev, cur]) = window(c, i, 2) else { return 0.0 };
    flag(
        prev.bullish()
            && prev.is_long()
            && cur.bearish()
            && cur.open > prev.high
            && cur.close < prev.mid_body()
            && cur.close > prev.open,
        -100.0,
    )
}

fn doji(c: &[Candle], i: usize, _: Trend) -> f64 {
    flag(c[i].is_doji(), 100.0)
}

fn doji_star(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    if !a.is_long() || !b.is_doji() {
        0.0
    } else if a.bullish() && b.gaps_above(&a) {
        -100.0
    } else if a.bearish() && b.gaps_below(&a) {
        100.0
    } else {
        0.0
    }
}

fn dragonfly_doji(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_doji() && k.upper_shadow() <= 0.1 * k.range() && k.lower_shadow() >= 0.6 * k.range(),
        100.0,
    )
}

fn engulfing(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[prev, cur]) = window(c, i, 2) else { return 0.0 };
    if prev.bearish() && cur.bullish() && cur.open <= prev.close && cur.close >= prev.open && cur.body() > prev.body() {
        100.0
    } else if prev.bullish() && cur.bearish() && cur.open >= prev.close && cur.close <= prev.open && cur.body() > prev.body() {
        -100.0
    } else {
        0.0
    }
}

fn evening_doji_star(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(i >= 1 && c[i - 1].is_doji() && evening_star(c, i, t) != 0.0, -100.0)
}

fn evening_star(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[first, star, last]) = window(c, i, 3) else { return 0.0 };
    flag(
        first.bullish()
            && first.is_long()
            && star.is_small()
            && star.bottom() > first.close
            && last.bearish()
            && last.close < first.mid_body(),
        -100.0,
    )
}

fn gap_side_side_white(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let twins = b.bullish()
        && d.bullish()
        && (b.body() - d.body()).abs() <= 0.3 * b.body().max(d.body())
        && near(b.open, d.open, c, i);
    if twins && b.gaps_above(&a) && d.gaps_above(&a) {
        100.0
    } else if twins && b.gaps_below(&a) && d.gaps_below(&a) {
        -100.0
    } else {
        0.0
    }
}

fn gravestone_doji(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_doji() && k.lower_shadow() <= 0.1 * k.range() && k.upper_shadow() >= 0.6 * k.range(),
        100.0,
    )
}

fn hammer_shape(k: Candle) -> bool {
    k.body() > 0.0 && k.lower_shadow() >= 2.0 * k.body() && k.upper_shadow() <= 0.1 * k.range()
}

fn inverted_shape(k: Candle) -> bool {
    k.body() > 0.0 && k.upper_shadow() >= 2.0 * k.body() && k.lower_shadow() <= 0.1 * k.range()
}

fn hammer(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(t == Trend::Down && hammer_shape(c[i]), 100.0)
}

fn hanging_man(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(t == Trend::Up && hammer_shape(c[i]), -100.0)
}

fn harami(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[prev, cur]) = window(c, i, 2) else { return 0.0 };
    let inside = prev.is_long() && cur.body_inside(&prev);
    if inside && prev.bearish() && cur.bullish() {
        100.0
    } else if inside && prev.bullish() && cur.bearish() {
        -100.0
    } else {
        0.0
    }
}

fn harami_cross(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(a.is_long() && b.is_doji() && b.top() <= a.top() && b.bottom() >= a.bottom(), -a.color())
}

fn high_wave(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_small() && k.upper_shadow() >= 3.0 * k.body() && k.lower_shadow() >= 3.0 * k.body(),
        k.direction(),
    )
}

fn hikkake(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let inside = b.high < a.high && b.low > a.low;
    if inside && d.high < b.high && d.low < b.low {
        100.0
    } else if inside && d.high > b.high && d.low > b.low {
        -100.0
    } else {
        0.0
    }
}

fn hikkake_mod(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e]) = window(c, i, 4) else { return 0.0 };
    let nested = b.high < a.high && b.low > a.low && d.high < b.high && d.low > b.low;
    if nested && d.close <= d.low + 0.25 * d.range() && e.high < d.high && e.low < d.low {
        100.0
    } else if nested && d.close >= d.high - 0.25 * d.range() && e.high > d.high && e.low > d.low {
        -100.0
    } else {
        0.0
    }
}

fn homing_pigeon(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(
        a.bearish() && a.is_long() && b.bearish() && b.open < a.open && b.close > a.close,
        100.0,
    )
}

fn identical_three_crows(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        [a, b, d].iter().all(Candle::bearish)
            && b.close < a.close
            && d.close < b.close
            && near(b.open, a.close, c, i)
            && near(d.open, b.close, c, i),
        -100.0,
    )
}

/// Long black candle followed by a white one opening below its low.
fn neck_setup(a: &Candle, b: &Candle) -> bool {
    a.bearish() && a.is_long() && b.bullish() && b.open < a.low
}

fn in_neck(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(
        neck_setup(&a, &b) && b.close >= a.close && b.close <= a.close + NEAR * a.range(),
        -100.0,
    )
}

fn inverted_hammer(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(t == Trend::Down && inverted_shape(c[i]), 100.0)
}

/// Opposite marubozus separated by a gap; `+1` when the gap is upward.
fn kick(c: &[Candle], i: usize) -> Option<(Candle, Candle, f64)> {
    let &[a, b] = window(c, i, 2)? else { return None };
    if !a.is_marubozu() || !b.is_marubozu() {
        return None;
    }
    if a.bearish() && b.bullish() && b.low > a.high {
        Some((a, b, 1.0))
    } else if a.bullish() && b.bearish() && b.high < a.low {
        Some((a, b, -1.0))
    } else {
        None
    }
}

fn kicking(c: &[Candle], i: usize, _: Trend) -> f64 {
    kick(c, i).map_or(0.0, |(_, _, dir)| 100.0 * dir)
}

fn kicking_by_length(c: &[Candle], i: usize, _: Trend) -> f64 {
    kick(c, i).map_or(0.0, |(a, b, _)| if b.body() >= a.body() { b.color() } else { a.color() })
}

fn ladder_bottom(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e, f]) = window(c, i, 5) else { return 0.0 };
    flag(
        [a, b, d, e].iter().all(Candle::bearish)
            && b.open < a.open
            && d.open < b.open
            && b.close < a.close
            && d.close < b.close
            && e.upper_shadow() > e.body()
            && f.bullish()
            && f.open > e.open
            && f.close > e.high,
        100.0,
    )
}

fn long_legged_doji(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_doji() && k.upper_shadow() >= 0.3 * k.range() && k.lower_shadow() >= 0.3 * k.range(),
        100.0,
    )
}

fn long_line(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_long()
            && k.body() > typical(c, i, Candle::body)
            && k.upper_shadow() <= 0.25 * k.range()
            && k.lower_shadow() <= 0.25 * k.range(),
        k.direction(),
    )
}

fn marubozu(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(k.range() > 0.0 && k.body() >= 0.95 * k.range(), k.color())
}

fn matching_low(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(a.bearish() && b.bearish() && near(a.close, b.close, c, i), 100.0)
}

fn mat_hold(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e, f]) = window(c, i, 5) else { return 0.0 };
    let pullback = [b, d, e].iter().all(|k| k.body() < 0.5 * a.body() && k.bottom() > a.bottom());
    flag(
        a.bullish()
            && a.is_long()
            && b.gaps_above(&a)
            && pullback
            && f.bullish()
            && f.close > b.high.max(d.high).max(e.high),
        100.0,
    )
}

fn morning_doji_star(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(i >= 1 && c[i - 1].is_doji() && morning_star(c, i, t) != 0.0, 100.0)
}

fn morning_star(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[first, star, last]) = window(c, i, 3) else { return 0.0 };
    flag(
        first.bearish()
            && first.is_long()
            && star.is_small()
            && star.top() < first.close
            && last.bullish()
            && last.close > first.mid_body(),
        100.0,
    )
}

fn on_neck(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(
        neck_setup(&a, &b) && b.close < a.close && (b.close - a.low).abs() <= NEAR * a.range(),
        -100.0,
    )
}

fn piercing(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[prev, cur]) = window(c, i, 2) else { return 0.0 };
    flag(
        prev.bearish()
            && prev.is_long()
            && cur.bullish()
            && cur.open < prev.low
            && cur.close > prev.mid_body()
            && cur.close < prev.open,
        100.0,
    )
}

fn rickshaw_man(c: &[Candle], i: usize, t: Trend) -> f64 {
    let k = c[i];
    let centred = (k.mid_body() - (k.high + k.low) / 2.0).abs() <= 0.1 * k.range();
    flag(long_legged_doji(c, i, t) != 0.0 && centred, 100.0)
}

fn rise_fall_three_methods(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d, e, f]) = window(c, i, 5) else { return 0.0 };
    if !a.is_long() {
        return 0.0;
    }
    let held = [b, d, e]
        .iter()
        .all(|k| k.body() < 0.5 * a.body() && k.high < a.high && k.low > a.low);
    if !held {
        return 0.0;
    }
    if a.bullish() && b.close > d.close && d.close > e.close && f.bullish() && f.open > e.close && f.close > a.close {
        100.0
    } else if a.bearish() && b.close < d.close && d.close < e.close && f.bearish() && f.open < e.close && f.close < a.close {
        -100.0
    } else {
        0.0
    }
}

fn separating_lines(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    let opposite = a.color() != 0.0 && a.color() == -b.color();
    let belt = belt_hold(c, i, Trend::Flat);
    flag(opposite && near(a.open, b.open, c, i) && belt == b.color(), b.color())
}

fn shooting_star(c: &[Candle], i: usize, t: Trend) -> f64 {
    flag(t == Trend::Up && inverted_shape(c[i]), -100.0)
}

fn short_line(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.body() > 0.0
            && k.body() < 0.5 * typical(c, i, Candle::body)
            && k.range() < 0.5 * typical(c, i, Candle::range),
        k.direction(),
    )
}

fn spinning_top(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_small() && !k.is_doji() && k.upper_shadow() > k.body() && k.lower_shadow() > k.body(),
        k.color(),
    )
}

fn stalled_pattern(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        [a, b, d].iter().all(Candle::bullish)
            && b.close > a.close
            && d.close > b.close
            && a.is_long()
            && b.is_long()
            && d.body() < 0.5 * b.body()
            && near(d.open, b.close, c, i),
        -100.0,
    )
}

fn stick_sandwich(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        a.bearish() && b.bullish() && b.low > a.close && d.bearish() && near(d.close, a.close, c, i),
        100.0,
    )
}

fn takuri(c: &[Candle], i: usize, _: Trend) -> f64 {
    let k = c[i];
    flag(
        k.is_doji() && k.upper_shadow() <= 0.1 * k.range() && k.lower_shadow() >= 0.75 * k.range(),
        100.0,
    )
}

fn tasuki_gap(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let alike = (b.body() - d.body()).abs() <= 0.3 * b.body();
    let up = a.bullish()
        && b.bullish()
        && b.gaps_above(&a)
        && d.bearish()
        && d.open < b.close
        && d.open > b.open
        && d.close < b.open
        && d.close > a.top();
    let down = a.bearish()
        && b.bearish()
        && b.gaps_below(&a)
        && d.bullish()
        && d.open > b.close
        && d.open < b.open
        && d.close > b.open
        && d.close < a.bottom();
    if alike && up {
        100.0
    } else if alike && down {
        -100.0
    } else {
        0.0
    }
}

fn thrusting(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b]) = window(c, i, 2) else { return 0.0 };
    flag(
        neck_setup(&a, &b) && b.close > a.close + NEAR * a.range() && b.close < a.mid_body(),
        -100.0,
    )
}

fn tristar(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    if !(a.is_doji() && b.is_doji() && d.is_doji()) {
        0.0
    } else if b.gaps_above(&a) && b.bottom() > d.top() {
        -100.0
    } else if b.gaps_below(&a) && b.top() < d.bottom() {
        100.0
    } else {
        0.0
    }
}

fn unique_three_river(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        a.bearish()
            && a.is_long()
            && b.bearish()
            && b.open < a.open
            && b.close > a.close
            && b.low < a.low
            && d.bullish()
            && d.open > b.low
            && d.close < b.close,
        100.0,
    )
}

fn upside_gap_two_crows(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    flag(
        a.bullish()
            && a.is_long()
            && b.bearish()
            && b.gaps_above(&a)
            && d.bearish()
            && d.open > b.open
            && d.close < b.close
            && d.close > a.close,
        -100.0,
    )
}

fn xside_gap_three_methods(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(&[a, b, d]) = window(c, i, 3) else { return 0.0 };
    let up = a.bullish()
        && b.bullish()
        && b.gaps_above(&a)
        && d.bearish()
        && d.open < b.close
        && d.open > b.open
        && d.close < a.close
        && d.close > a.open;
    let down = a.bearish()
        && b.bearish()
        && b.gaps_below(&a)
        && d.bullish()
        && d.open > b.close
        && d.open < b.open
        && d.close > a.close
        && d.close < a.open;
    if up {
        100.0
    } else if down {
        -100.0
    } else {
        0.0
    }
}

fn three_white_soldiers(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(w) = window(c, i, 3) else { return 0.0 };
    let hit = w.iter().all(|k| k.bullish() && k.upper_shadow() <= 0.3 * k.body())
        && w.windows(2).all(|p| {
            p[1].close > p[0].close && p[1].open > p[0].open && p[1].open <= p[0].close
        });
    flag(hit, 100.0)
}

fn three_black_crows(c: &[Candle], i: usize, _: Trend) -> f64 {
    let Some(w) = window(c, i, 3) else { return 0.0 };
    let hit = w.iter().all(|k| k.bearish() && k.lower_shadow() <= 0.3 * k.body())
        && w.windows(2).all(|p| {
            p[1].close < p[0].close && p[1].open < p[0].open && p[1].open >= p[0].close
        });
    flag(hit, -100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    fn table(rows: &[(f64, f64, f64, f64)]) -> PriceTable {
        let mut p = test_prices(rows.len());
        p.open = rows.iter().map(|r| r.0).collect();
        p.high = rows.iter().map(|r| r.1).collect();
        p.low = rows.iter().map(|r| r.2).collect();
        p.close = rows.iter().map(|r| r.3).collect();
        p
    }

    fn last(set: &IndicatorSet, name: &str) -> Option<f64> {
        *set.get(name).unwrap().last().unwrap()
    }

    #[test]
    fn full_pattern_list_in_alphabetical_order() {
        let set = compute(&test_prices(30));
        let names = set.names();
        assert_eq!(names.len(), 61);
        assert_eq!(names[0], "CDL2CROWS");
        assert_eq!(names[60], "CDLXSIDEGAP3METHODS");
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        for (_, values) in set.columns() {
            assert!(values.iter().flatten().all(|v| [-100.0, 0.0, 100.0].contains(v)));
        }
    }

    #[test]
    fn single_candle_shapes() {
        let p = table(&[(10.0, 10.1, 8.0, 10.05)]);
        let set = compute(&p);
        assert_eq!(last(&set, "CDLDOJI"), Some(100.0));
        assert_eq!(last(&set, "CDLDRAGONFLYDOJI"), Some(100.0));
        assert_eq!(last(&set, "CDLTAKURI"), Some(100.0));
        assert_eq!(last(&set, "CDLGRAVESTONEDOJI"), Some(0.0));
        assert_eq!(last(&set, "CDLLONGLEGGEDDOJI"), Some(0.0));

        let p = table(&[(10.0, 12.0, 10.0, 12.0)]);
        let set = compute(&p);
        assert_eq!(last(&set, "CDLMARUBOZU"), Some(100.0));
        assert_eq!(last(&set, "CDLBELTHOLD"), Some(100.0));
        assert_eq!(last(&set, "CDLCLOSINGMARUBOZU"), Some(100.0));

        let p = table(&[(10.0, 11.0, 9.0, 10.02)]);
        let set = compute(&p);
        assert_eq!(last(&set, "CDLLONGLEGGEDDOJI"), Some(100.0));
        assert_eq!(last(&set, "CDLRICKSHAWMAN"), Some(100.0));
    }

    #[test]
    fn engulfing_both_ways() {
        let bull = table(&[(11.0, 11.2, 9.8, 10.0), (9.9, 11.5, 9.8, 11.4)]);
        assert_eq!(last(&compute(&bull), "CDLENGULFING"), Some(100.0));
        let bear = table(&[(10.0, 11.2, 9.8, 11.0), (11.1, 11.2, 9.5, 9.6)]);
        assert_eq!(last(&compute(&bear), "CDLENGULFING"), Some(-100.0));
    }

    #[test]
    fn engulfing_confirmed_by_a_higher_close() {
        let rows = [
            (11.0, 11.2, 9.8, 10.0),
            (9.9, 11.5, 9.8, 11.4),
            (11.4, 12.1, 11.3, 12.0),
        ];
        assert_eq!(last(&compute(&table(&rows)), "CDL3OUTSIDE"), Some(100.0));
    }

    #[test]
    fn hammer_needs_downtrend() {
        let mut rows: Vec<(f64, f64, f64, f64)> = (0..7)
            .map(|i| {
                let c = 20.0 - i as f64;
                (c + 0.5, c + 0.6, c - 0.1, c)
            })
            .collect();
        rows.push((13.0, 13.35, 11.0, 13.3));
        let set = compute(&table(&rows));
        assert_eq!(last(&set, "CDLHAMMER"), Some(100.0));
        assert_eq!(last(&set, "CDLHANGINGMAN"), Some(0.0));
    }

    #[test]
    fn three_soldiers() {
        let rows = [
            (10.0, 11.05, 9.9, 11.0),
            (10.5, 12.05, 10.4, 12.0),
            (11.5, 13.05, 11.4, 13.0),
        ];
        assert_eq!(last(&compute(&table(&rows)), "CDL3WHITESOLDIERS"), Some(100.0));
    }

    #[test]
    fn two_crows_after_a_gap() {
        let rows = [
            (10.0, 12.1, 9.9, 12.0),
            (13.0, 13.6, 12.4, 12.5),
            (12.8, 12.9, 11.0, 11.2),
        ];
        let set = compute(&table(&rows));
        assert_eq!(last(&set, "CDL2CROWS"), Some(-100.0));
        assert_eq!(last(&set, "CDLUPSIDEGAP2CROWS"), Some(0.0));
    }

    #[test]
    fn harami_confirmed_into_three_inside() {
        let rows = [
            (12.0, 12.1, 9.9, 10.0),
            (10.5, 11.2, 10.4, 11.0),
            (11.0, 12.6, 10.9, 12.5),
        ];
        let set = compute(&table(&rows));
        assert_eq!(last(&set, "CDL3INSIDE"), Some(100.0));
    }

    #[test]
    fn kicking_marubozus() {
        let rows = [(12.0, 12.0, 10.0, 10.0), (12.5, 15.5, 12.5, 15.5)];
        let set = compute(&table(&rows));
        assert_eq!(last(&set, "CDLKICKING"), Some(100.0));
        assert_eq!(last(&set, "CDLKICKINGBYLENGTH"), Some(100.0));

        let rows = [(10.0, 13.0, 10.0, 13.0), (9.0, 9.0, 8.0, 8.0)];
        let set = compute(&table(&rows));
        assert_eq!(last(&set, "CDLKICKING"), Some(-100.0));
        // the first marubozu is the longer one
        assert_eq!(last(&set, "CDLKICKINGBYLENGTH"), Some(100.0));
    }

    #[test]
    fn rising_three_methods() {
        let rows = [
            (10.0, 14.1, 9.9, 14.0),
            (13.8, 13.9, 13.0, 13.2),
            (13.2, 13.3, 12.5, 12.7),
            (12.7, 12.9, 12.0, 12.2),
            (12.4, 15.1, 12.3, 15.0),
        ];
        assert_eq!(last(&compute(&table(&rows)), "CDLRISEFALL3METHODS"), Some(100.0));
    }

    #[test]
    fn inside_bar_false_breakout() {
        let rows = [(10.0, 12.0, 8.0, 11.0), (10.5, 11.5, 9.0, 11.0), (10.0, 11.0, 8.5, 9.0)];
        assert_eq!(last(&compute(&table(&rows)), "CDLHIKKAKE"), Some(100.0));
    }

    #[test]
    fn doji_tristar_tops() {
        let rows = [(10.0, 10.5, 9.5, 10.02), (11.0, 11.5, 10.5, 11.02), (10.0, 10.5, 9.5, 9.98)];
        assert_eq!(last(&compute(&table(&rows)), "CDLTRISTAR"), Some(-100.0));
    }
}
