use ta::indicators::{Maximum, Minimum, StandardDeviation};

use super::IndicatorSet;
use super::rolling::{argmax, argmin, linreg, rolling_apply, ta_series, zip_map};
use crate::table::PriceTable;

const MID_PERIOD: usize = 14;
const REG_PERIOD: usize = 14;
const DEV_PERIOD: usize = 30;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let close = &p.close;
    let len = p.len();
    let mut set = IndicatorSet::new();

    let per_row = |f: &dyn Fn(usize) -> f64| (0..len).map(|i| Some(f(i))).collect::<Vec<_>>();
    set.insert("AVGPRICE", per_row(&|i| (p.open[i] + p.high[i] + p.low[i] + p.close[i]) / 4.0));
    set.insert("MEDPRICE", per_row(&|i| (p.high[i] + p.low[i]) / 2.0));
    set.insert("TYPPRICE", per_row(&|i| (p.high[i] + p.low[i] + p.close[i]) / 3.0));
    set.insert("WCLPRICE", per_row(&|i| (p.high[i] + p.low[i] + 2.0 * p.close[i]) / 4.0));

    let warm = MID_PERIOD - 1;
    let cmax = ta_series(Maximum::new(MID_PERIOD), close.clone(), warm);
    let cmin = ta_series(Minimum::new(MID_PERIOD), close.clone(), warm);
    set.insert("MIDPOINT", zip_map(&cmax, &cmin, |a, b| (a + b) / 2.0));
    let hmax = ta_series(Maximum::new(MID_PERIOD), p.high.clone(), warm);
    let lmin = ta_series(Minimum::new(MID_PERIOD), p.low.clone(), warm);
    set.insert("MIDPRICE", zip_map(&hmax, &lmin, |a, b| (a + b) / 2.0));

    let n = REG_PERIOD as f64;
    let reg = |f: fn(f64, f64, f64) -> f64| {
        rolling_apply(close, REG_PERIOD, move |s| linreg(s).map(|(slope, icpt)| f(slope, icpt, n)))
    };
    set.insert("LINEARREG", reg(|slope, icpt, n| icpt + slope * (n - 1.0)));
    set.insert("LINEARREG_ANGLE", reg(|slope, _, _| slope.atan().to_degrees()));
    set.insert("LINEARREG_INTERCEPT", reg(|_, icpt, _| icpt));
    set.insert("LINEARREG_SLOPE", reg(|slope, _, _| slope));

    let std = ta_series(StandardDeviation::new(DEV_PERIOD), close.clone(), DEV_PERIOD - 1);
    let var = std.iter().map(|s| s.map(|s| s * s)).collect();
    set.insert("STDDEV", std);
    set.insert("TSF", reg(|slope, icpt, n| icpt + slope * n));
    set.insert("VAR", var);

    // absolute row index of the window extreme
    let absolute = |pick: fn(&[f64]) -> Option<usize>| {
        let mut out = rolling_apply(close, DEV_PERIOD, |s| pick(s).map(|j| j as f64));
        for (i, v) in out.iter_mut().enumerate() {
            if let Some(off) = v.as_mut() {
                *off += (i + 1 - DEV_PERIOD) as f64;
            }
        }
        out
    };
    set.insert("MAXINDEX", absolute(argmax));
    set.insert("MININDEX", absolute(argmin));

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    #[test]
    fn price_transforms() {
        let mut p = test_prices(1);
        p.open = vec![1.0];
        p.high = vec![4.0];
        p.low = vec![0.0];
        p.close = vec![3.0];
        let set = compute(&p);
        assert_eq!(set.get("AVGPRICE").unwrap()[0], Some(2.0));
        assert_eq!(set.get("MEDPRICE").unwrap()[0], Some(2.0));
        assert_eq!(set.get("WCLPRICE").unwrap()[0], Some(2.5));
        assert!(set.get("MIDPOINT").unwrap()[0].is_none());
    }

    #[test]
    fn regression_on_a_line() {
        let mut p = test_prices(40);
        p.close = (0..40).map(|i| 5.0 + 2.0 * i as f64).collect();
        let set = compute(&p);
        let lr = set.get("LINEARREG").unwrap()[20].unwrap();
        let tsf = set.get("TSF").unwrap()[20].unwrap();
        let slope = set.get("LINEARREG_SLOPE").unwrap()[20].unwrap();
        assert!((lr - p.close[20]).abs() < 1e-9);
        assert!((tsf - (p.close[20] + 2.0)).abs() < 1e-9);
        assert!((slope - 2.0).abs() < 1e-9);
        assert_eq!(set.get("MAXINDEX").unwrap()[35], Some(35.0));
        assert_eq!(set.get("MININDEX").unwrap()[35], Some(6.0));
    }

    #[test]
    fn column_count() {
        assert_eq!(compute(&PriceTable::empty("X")).len(), 15);
    }
}
