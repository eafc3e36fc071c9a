//! The Alpha360 block: the last 60 sessions of each raw field, divided by
//! today's close (prices) or today's volume.

use super::IndicatorSet;
use super::rolling::{EPS, safe_div, session_vwap};
use crate::table::PriceTable;

pub const LOOKBACK: usize = 60;

pub fn compute(p: &PriceTable) -> IndicatorSet {
    let vwap = session_vwap(p);
    let fields: [(&str, &[f64]); 6] = [
        ("CLOSE", &p.close),
        ("OPEN", &p.open),
        ("HIGH", &p.high),
        ("LOW", &p.low),
        ("VWAP", &vwap),
        ("VOLUME", &p.volume),
    ];

    let mut set = IndicatorSet::new();
    for (field, values) in fields {
        let by_volume = field == "VOLUME";
        for lag in (0..LOOKBACK).rev() {
            let column = (0..p.len())
                .map(|i| {
                    let past = values[i.checked_sub(lag)?];
                    Some(if by_volume {
                        safe_div(past, p.volume[i] + EPS)
                    } else {
                        safe_div(past, p.close[i])
                    })
                })
                .collect();
            set.insert(format!("ALPHA360_{}{}", field, lag), column);
        }
    }
    set
}
