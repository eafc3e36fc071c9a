//! Ehlers' Hilbert-transform cycle measures and the MESA adaptive moving
//! average, all driven from one pass over the close.

use super::IndicatorSet;
use super::rolling::mask;
use crate::table::PriceTable;

const HT_A: f64 = 0.0962;
const HT_B: f64 = 0.5769;

/// Rows before the period estimate and the phasor settle.
const PERIOD_WARMUP: usize = 32;
/// Rows before phase, sine, trend mode and trendline settle.
const PHASE_WARMUP: usize = 63;

const MAMA_FAST: f64 = 0.5;
const MAMA_SLOW: f64 = 0.05;

#[derive(Debug, Default)]
struct Cycle {
    smooth_period: Vec<f64>,
    in_phase: Vec<f64>,
    quadrature: Vec<f64>,
    dc_phase: Vec<f64>,
    sine: Vec<f64>,
    lead_sine: Vec<f64>,
    trend_mode: Vec<f64>,
    trendline: Vec<f64>,
    mama: Vec<f64>,
    fama: Vec<f64>,
}

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let c = analyse(&p.close);
    let mut set = IndicatorSet::new();
    set.insert("HT_DCPERIOD", mask(c.smooth_period, PERIOD_WARMUP));
    set.insert("HT_DCPHASE", mask(c.dc_phase, PHASE_WARMUP));
    set.insert("HT_INPHASE", mask(c.in_phase, PERIOD_WARMUP));
    set.insert("HT_QUADRATURE", mask(c.quadrature, PERIOD_WARMUP));
    set.insert("HT_SINE", mask(c.sine, PHASE_WARMUP));
    set.insert("HT_LEADSINE", mask(c.lead_sine, PHASE_WARMUP));
    set.insert("HT_TRENDMODE", mask(c.trend_mode, PHASE_WARMUP));
    set.insert("HT_TRENDLINE", mask(c.trendline, PHASE_WARMUP));
    set.insert("MAMA", mask(c.mama, PERIOD_WARMUP));
    set.insert("FAMA", mask(c.fama, PERIOD_WARMUP));
    set
}

/// Four-tap Hilbert FIR over `x` ending at row `i`.
fn hilbert(x: &[f64], i: usize, adj: f64) -> f64 {
    if i < 6 {
        return 0.0;
    }
    (HT_A * x[i] + HT_B * x[i - 2] - HT_B * x[i - 4] - HT_A * x[i - 6]) * adj
}

/// Four-bar weighted average `(4a + 3b + 2c + d) / 10` ending at row `i`.
fn wma4(x: &[f64], i: usize) -> f64 {
    if i < 3 {
        return x[i];
    }
    (4.0 * x[i] + 3.0 * x[i - 1] + 2.0 * x[i - 2] + x[i - 3]) / 10.0
}

fn analyse(price: &[f64]) -> Cycle {
    let n = price.len();
    let mut smooth = vec![0.0; n];
    let mut detrender = vec![0.0; n];
    let mut i1 = vec![0.0; n];
    let mut q1 = vec![0.0; n];
    let mut itrend = vec![0.0; n];
    let mut out = Cycle::default();

    let (mut i2_prev, mut q2_prev, mut re_prev, mut im_prev) = (0.0, 0.0, 0.0, 0.0);
    let mut period = 0.0_f64;
    let mut smooth_period = 0.0_f64;
    let mut mama_phase_prev = 0.0_f64;
    let mut mama = price.first().copied().unwrap_or(0.0);
    let mut fama = mama;
    let mut dc_phase = 0.0_f64;
    let (mut sine_prev, mut lead_prev) = (0.0, 0.0);
    let mut days_in_trend = 0usize;

    for i in 0..n {
        smooth[i] = wma4(price, i);
        let adj = 0.075 * period + 0.54;
        detrender[i] = hilbert(&smooth, i, adj);
        q1[i] = hilbert(&detrender, i, adj);
        i1[i] = if i >= 3 { detrender[i - 3] } else { 0.0 };
        let ji = hilbert(&i1, i, adj);
        let jq = hilbert(&q1, i, adj);

        let i2 = 0.2 * (i1[i] - jq) + 0.8 * i2_prev;
        let q2 = 0.2 * (q1[i] + ji) + 0.8 * q2_prev;
        let re = 0.2 * (i2 * i2_prev + q2 * q2_prev) + 0.8 * re_prev;
        let im = 0.2 * (i2 * q2_prev - q2 * i2_prev) + 0.8 * im_prev;
        (i2_prev, q2_prev, re_prev, im_prev) = (i2, q2, re, im);

        let prev_period = period;
        if im != 0.0 && re != 0.0 {
            period = 360.0 / (im / re).atan().to_degrees();
        }
        if period > 1.5 * prev_period {
            period = 1.5 * prev_period;
        }
        if period < 0.67 * prev_period {
            period = 0.67 * prev_period;
        }
        period = period.clamp(6.0, 50.0);
        period = 0.2 * period + 0.8 * prev_period;
        smooth_period = 0.33 * period + 0.67 * smooth_period;

        // MAMA: alpha follows the rate of phase change
        let phase = if i1[i] != 0.0 {
            (q1[i] / i1[i]).atan().to_degrees()
        } else {
            0.0
        };
        let delta = (mama_phase_prev - phase).max(1.0);
        mama_phase_prev = phase;
        let alpha = (MAMA_FAST / delta).clamp(MAMA_SLOW, MAMA_FAST);
        mama = alpha * price[i] + (1.0 - alpha) * mama;
        fama = 0.5 * alpha * mama + (1.0 - 0.5 * alpha) * fama;

        // dominant cycle phase over one smoothed period
        let dc_period = ((smooth_period + 0.5) as usize).max(1);
        let (mut real, mut imag) = (0.0, 0.0);
        for k in 0..dc_period.min(i + 1) {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / dc_period as f64;
            real += angle.sin() * smooth[i - k];
            imag += angle.cos() * smooth[i - k];
        }
        let prev_dc_phase = dc_phase;
        if imag.abs() > 0.0 {
            dc_phase = (real / imag).atan().to_degrees();
        } else if real < 0.0 {
            dc_phase -= 90.0;
        } else if real > 0.0 {
            dc_phase += 90.0;
        }
        dc_phase += 90.0;
        if smooth_period > 0.0 {
            dc_phase += 360.0 / smooth_period;
        }
        if imag < 0.0 {
            dc_phase += 180.0;
        }
        if dc_phase > 315.0 {
            dc_phase -= 360.0;
        }
        let sine = dc_phase.to_radians().sin();
        let lead = (dc_phase + 45.0).to_radians().sin();

        let span = dc_period.min(i + 1);
        itrend[i] = price[i + 1 - span..=i].iter().sum::<f64>() / span as f64;
        let trendline = wma4(&itrend, i);

        let mut trend = 1.0;
        if (sine > lead && sine_prev <= lead_prev) || (sine < lead && sine_prev >= lead_prev) {
            days_in_trend = 0;
            trend = 0.0;
        }
        days_in_trend += 1;
        if (days_in_trend as f64) < 0.5 * smooth_period {
            trend = 0.0;
        }
        let phase_step = dc_phase - prev_dc_phase;
        if smooth_period > 0.0
            && phase_step > 0.67 * 360.0 / smooth_period
            && phase_step < 1.5 * 360.0 / smooth_period
        {
            trend = 0.0;
        }
        if trendline != 0.0 && ((smooth[i] - trendline) / trendline).abs() >= 0.015 {
            trend = 1.0;
        }
        (sine_prev, lead_prev) = (sine, lead);

        out.smooth_period.push(smooth_period);
        out.dc_phase.push(dc_phase);
        out.sine.push(sine);
        out.lead_sine.push(lead);
        out.trend_mode.push(trend);
        out.trendline.push(trendline);
        out.mama.push(mama);
        out.fama.push(fama);
    }
    out.in_phase = i1;
    out.quadrature = q1;
    out
}
