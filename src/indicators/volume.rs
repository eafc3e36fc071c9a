use ta::indicators::OnBalanceVolume;

use super::IndicatorSet;
use super::rolling::{bars, ema, mask, safe_div, ta_series};
use crate::table::PriceTable;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let mut set = IndicatorSet::new();

    let bars = bars(p);
    set.insert("OBV", ta_series(Ok(OnBalanceVolume::new()), bars.iter().collect(), 0));

    let ad = accumulation_distribution(p);
    let fast = ema(&ad, 3);
    let slow = ema(&ad, 10);
    let adosc = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    set.insert("AD", ad.iter().map(|v| Some(*v)).collect());
    set.insert("ADOSC", mask(adosc, 9));

    set
}

/// Chaikin accumulation/distribution line.
fn accumulation_distribution(p: &PriceTable) -> Vec<f64> {
    let mut acc = 0.0;
    (0..p.len())
        .map(|i| {
            let (h, l, c) = (p.high[i], p.low[i], p.close[i]);
            acc += safe_div((c - l) - (h - c), h - l) * p.volume[i];
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_prices;

    #[test]
    fn ad_accumulates_close_location() {
        let mut p = test_prices(3);
        p.high = vec![10.0, 10.0, 10.0];
        p.low = vec![0.0, 0.0, 5.0];
        p.close = vec![10.0, 0.0, 5.0];
        p.volume = vec![100.0, 50.0, 10.0];
        assert_eq!(accumulation_distribution(&p), vec![100.0, 50.0, 40.0]);
    }

    #[test]
    fn obv_moves_with_close() {
        let set = compute(&test_prices(40));
        assert_eq!(set.len(), 3);
        assert!(set.get("OBV").unwrap()[0].is_some());
        let adosc = set.get("ADOSC").unwrap();
        assert!(adosc[8].is_none() && adosc[9].is_some());
    }
}
