use chrono::NaiveDate;
use md5::{Digest, Md5};
use std::collections::BTreeMap;

use crate::status::parse_lenient_date;
use crate::table::PriceTable;

/// Fingerprint lookup key: `SYMBOL` or `SYMBOL_start_end`.
pub fn fingerprint_key(symbol: &str, window: Option<(NaiveDate, NaiveDate)>) -> String {
    match window {
        Some((start, end)) => format!("{}_{}_{}", symbol, start, end),
        None => symbol.to_string(),
    }
}

/// MD5 over the OHLCV rows inside `window`, row-major, little-endian f64.
///
/// Absent data or an empty window yields "", which takes part in equality
/// checks like any other digest.
pub fn compute_fingerprint(
    prices: Option<&PriceTable>,
    window: Option<(NaiveDate, NaiveDate)>,
) -> String {
    let Some(prices) = prices else {
        return String::new();
    };
    let mut hasher = Md5::new();
    let mut rows = 0usize;
    for i in 0..prices.len() {
        let date = prices.dates[i];
        if let Some((start, end)) = window
            && (date < start || date > end)
        {
            continue;
        }
        for series in [&prices.open, &prices.high, &prices.low, &prices.close, &prices.volume] {
            let v = series.get(i).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            hasher.update(v.to_le_bytes());
        }
        rows += 1;
    }
    if rows == 0 {
        return String::new();
    }
    hex::encode(hasher.finalize())
}

/// Whether `key` is `symbol` itself or one of its `SYMBOL_start_end` window keys.
fn belongs_to(key: &str, symbol: &str) -> bool {
    if key == symbol {
        return true;
    }
    let Some(window) = key.strip_prefix(symbol).and_then(|r| r.strip_prefix('_')) else {
        return false;
    };
    let mut parts = window.splitn(2, '_');
    matches!(
        (parts.next().and_then(parse_lenient_date), parts.next().and_then(parse_lenient_date)),
        (Some(_), Some(_))
    )
}

/// A digest computed during planning, committed only once the symbol was recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFingerprint {
    pub symbol: String,
    pub key: String,
    pub digest: String,
}

/// Persisted key -> digest map (`data_hashes.json`).
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    hashes: BTreeMap<String, String>,
}

impl ChangeDetector {
    pub fn new(hashes: BTreeMap<String, String>) -> Self {
        Self { hashes }
    }

    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    pub fn stored(&self, key: &str) -> &str {
        self.hashes.get(key).map(String::as_str).unwrap_or("")
    }

    /// Pure query: does `digest` differ from what was last committed under `key`?
    pub fn has_changed(&self, key: &str, digest: &str) -> bool {
        self.stored(key) != digest
    }

    /// Fingerprint the symbol and compare, without touching stored state.
    pub fn check(
        &self,
        symbol: &str,
        prices: Option<&PriceTable>,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> (bool, PendingFingerprint) {
        let pending = PendingFingerprint {
            symbol: symbol.to_string(),
            key: fingerprint_key(symbol, window),
            digest: compute_fingerprint(prices, window),
        };
        (self.has_changed(&pending.key, &pending.digest), pending)
    }

    /// Store the digest and drop every other key of the same symbol, so a
    /// moving window leaves one entry per symbol.
    pub fn commit(&mut self, pending: PendingFingerprint) {
        self.hashes
            .retain(|k, _| *k == pending.key || !belongs_to(k, &pending.symbol));
        self.hashes.insert(pending.key, pending.digest);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn prices() -> PriceTable {
        PriceTable {
            symbol: "AAA".into(),
            dates: vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03")],
            open: vec![1.0, 2.0, 3.0],
            high: vec![1.5, 2.5, 3.5],
            low: vec![0.5, 1.5, 2.5],
            close: vec![1.2, 2.2, 3.2],
            volume: vec![100.0, 200.0, 300.0],
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        let p = prices();
        let a = compute_fingerprint(Some(&p), None);
        assert_eq!(a.len(), 32);
        assert_eq!(a, compute_fingerprint(Some(&p), None));
    }

    #[test]
    fn change_inside_window_is_detected_outside_is_not() {
        let p = prices();
        let window = Some((d("2024-01-02"), d("2024-01-03")));
        let base = compute_fingerprint(Some(&p), window);

        let mut inside = p.clone();
        inside.close[2] = 9.9;
        assert_ne!(base, compute_fingerprint(Some(&inside), window));

        let mut outside = p.clone();
        outside.close[0] = 9.9;
        assert_eq!(base, compute_fingerprint(Some(&outside), window));
        assert_ne!(
            compute_fingerprint(Some(&p), None),
            compute_fingerprint(Some(&outside), None)
        );
    }

    #[test]
    fn missing_values_hash_as_zero() {
        let mut a = prices();
        a.volume[1] = f64::NAN;
        let mut b = prices();
        b.volume[1] = 0.0;
        assert_eq!(compute_fingerprint(Some(&a), None), compute_fingerprint(Some(&b), None));
    }

    #[test]
    fn absent_data_is_empty_digest() {
        assert_eq!(compute_fingerprint(None, None), "");
        let window = Some((d("2030-01-01"), d("2030-01-02")));
        assert_eq!(compute_fingerprint(Some(&prices()), window), "");
    }

    #[test]
    fn check_does_not_mutate_until_commit() {
        let p = prices();
        let mut det = ChangeDetector::default();
        let (changed, pending) = det.check("AAA", Some(&p), p.date_range());
        assert!(changed);
        assert_eq!(pending.key, "AAA_2024-01-01_2024-01-03");
        let (again, _) = det.check("AAA", Some(&p), p.date_range());
        assert!(again);

        det.commit(pending);
        let (after, _) = det.check("AAA", Some(&p), p.date_range());
        assert!(!after);
    }

    #[test]
    fn empty_digest_matches_missing_entry() {
        let det = ChangeDetector::default();
        assert!(!det.has_changed("GONE", ""));
    }

    #[test]
    fn commit_replaces_older_window_keys() {
        let p = prices();
        let mut det = ChangeDetector::new(BTreeMap::from([
            ("AAA".to_string(), "old".to_string()),
            ("AAAB_2024-01-01_2024-01-02".to_string(), "other".to_string()),
            ("AAA_2023-12-01 00:00:00_2023-12-31 00:00:00".to_string(), "legacy".to_string()),
        ]));
        for end in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            let (_, pending) = det.check("AAA", Some(&p), Some((d("2023-12-30"), d(end))));
            det.commit(pending);
        }
        let keys: Vec<&String> = det.hashes().keys().collect();
        assert_eq!(keys, ["AAAB_2024-01-01_2024-01-02", "AAA_2023-12-30_2024-01-03"]);

        assert!(belongs_to("AAA", "AAA"));
        assert!(!belongs_to("AAA_NOTE", "AAA"));
        assert!(!belongs_to("AAAB", "AAA"));
    }
}
