use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

pub const DATE_COL: &str = "Date";
pub const SYMBOL_COL: &str = "Symbol";

/// Columns every output row starts with, in order.
pub const BASE_COLUMNS: [&str; 7] = [DATE_COL, SYMBOL_COL, "Open", "High", "Low", "Close", "Volume"];

/// Daily OHLCV history of one symbol, one entry per trading day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceTable {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// First and last observed date.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }

    /// Rows whose date lies in the inclusive `[start, end]` window.
    pub fn window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceTable {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        let pick = |v: &[f64]| keep.iter().map(|&i| v[i]).collect::<Vec<_>>();
        PriceTable {
            symbol: self.symbol.clone(),
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            open: pick(&self.open),
            high: pick(&self.high),
            low: pick(&self.low),
            close: pick(&self.close),
            volume: pick(&self.volume),
        }
    }
}

/// A string-celled wide table, the shape of the output CSV.
///
/// Cells hold the serialized value; the empty string means missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Missing column names out of `names`.
    pub fn missing_columns(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|n| self.column_index(n).is_none())
            .map(|n| n.to_string())
            .collect()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// `Symbol_Date` for every row, or `None` if either column is absent.
    pub fn composite_keys(&self) -> Option<Vec<String>> {
        let s = self.column_index(SYMBOL_COL)?;
        let d = self.column_index(DATE_COL)?;
        Some(
            self.rows
                .iter()
                .map(|r| composite_key(cell_at(r, s), cell_at(r, d)))
                .collect(),
        )
    }

    /// Re-shape to `columns`, filling absent cells with "".
    pub fn project(&self, columns: &[String]) -> Frame {
        let lookup: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let idx: Vec<Option<usize>> = columns.iter().map(|c| lookup.get(c.as_str()).copied()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                idx.iter()
                    .map(|i| i.map(|i| cell_at(r, i).to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Frame {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Stack frames vertically over the union of their columns (first-seen order).
    pub fn concat(frames: Vec<Frame>) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for f in &frames {
            for c in &f.columns {
                if seen.insert(c.clone()) {
                    columns.push(c.clone());
                }
            }
        }
        let mut out = Frame::new(columns.clone());
        for f in frames {
            if f.columns == columns {
                out.rows.extend(f.rows);
            } else {
                out.rows.extend(f.project(&columns).rows);
            }
        }
        out
    }

    /// Put `preferred` columns first (those present), then the rest in current order.
    pub fn reorder(&self, preferred: &[String]) -> Frame {
        let present: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let mut order: Vec<String> = preferred
            .iter()
            .filter(|c| present.contains(c.as_str()))
            .cloned()
            .collect();
        let placed: HashSet<String> = order.iter().cloned().collect();
        order.extend(self.columns.iter().filter(|c| !placed.contains(*c)).cloned());
        if order == self.columns {
            return self.clone();
        }
        self.project(&order)
    }

    /// Stable sort by (Date, Symbol). No-op when either column is missing.
    pub fn sort_by_date_symbol(&mut self) {
        let (Some(d), Some(s)) = (self.column_index(DATE_COL), self.column_index(SYMBOL_COL)) else {
            return;
        };
        self.rows.sort_by(|a, b| {
            cell_at(a, d)
                .cmp(cell_at(b, d))
                .then_with(|| cell_at(a, s).cmp(cell_at(b, s)))
        });
    }

    /// Smallest and largest value of the Date column, compared as ISO strings.
    pub fn date_span(&self) -> Option<(String, String)> {
        let d = self.column_index(DATE_COL)?;
        let mut dates = self.rows.iter().map(|r| cell_at(r, d)).filter(|s| !s.is_empty());
        let first = dates.next()?;
        let (lo, hi) = dates.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some((lo.to_string(), hi.to_string()))
    }

    /// Number of distinct non-empty values in the Symbol column.
    pub fn symbol_count(&self) -> usize {
        let Some(s) = self.column_index(SYMBOL_COL) else {
            return 0;
        };
        self.rows
            .iter()
            .map(|r| cell_at(r, s))
            .filter(|v| !v.is_empty())
            .collect::<HashSet<_>>()
            .len()
    }
}

pub fn composite_key(symbol: &str, date: &str) -> String {
    format!("{}_{}", symbol, date)
}

fn cell_at(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Serialize a numeric cell; missing and non-finite values become "".
pub fn format_value(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{}", x),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(columns: &[&str], rows: &[&[&str]]) -> Frame {
        Frame {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn concat_unions_columns_and_pads() {
        let a = frame(&["Date", "Symbol", "X"], &[&["2024-01-01", "A", "1"]]);
        let b = frame(&["Date", "Symbol", "Y"], &[&["2024-01-01", "B", "2"]]);
        let c = Frame::concat(vec![a, b]);
        assert_eq!(c.columns, vec!["Date", "Symbol", "X", "Y"]);
        assert_eq!(c.rows[0], vec!["2024-01-01", "A", "1", ""]);
        assert_eq!(c.rows[1], vec!["2024-01-01", "B", "", "2"]);
    }

    #[test]
    fn sort_orders_by_date_then_symbol() {
        let mut f = frame(
            &["Symbol", "Date"],
            &[&["B", "2024-01-02"], &["B", "2024-01-01"], &["A", "2024-01-02"]],
        );
        f.sort_by_date_symbol();
        let keys = f.composite_keys().unwrap();
        assert_eq!(keys, vec!["B_2024-01-01", "A_2024-01-02", "B_2024-01-02"]);
    }

    #[test]
    fn reorder_keeps_unknown_columns_last() {
        let f = frame(&["Extra", "Symbol", "Date"], &[&["x", "A", "d"]]);
        let r = f.reorder(&["Date".to_string(), "Symbol".to_string(), "Open".to_string()]);
        assert_eq!(r.columns, vec!["Date", "Symbol", "Extra"]);
        assert_eq!(r.rows[0], vec!["d", "A", "x"]);
    }

    #[test]
    fn window_filters_inclusive() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let t = PriceTable {
            symbol: "AAA".into(),
            dates: vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03")],
            open: vec![1.0, 2.0, 3.0],
            high: vec![1.0, 2.0, 3.0],
            low: vec![1.0, 2.0, 3.0],
            close: vec![1.0, 2.0, 3.0],
            volume: vec![1.0, 2.0, 3.0],
        };
        let w = t.window(Some(d("2024-01-02")), Some(d("2024-01-03")));
        assert_eq!(w.close, vec![2.0, 3.0]);
        assert_eq!(w.date_range(), Some((d("2024-01-02"), d("2024-01-03"))));
    }

    #[test]
    fn format_value_blanks_missing() {
        assert_eq!(format_value(None), "");
        assert_eq!(format_value(Some(f64::NAN)), "");
        assert_eq!(format_value(Some(1.5)), "1.5");
    }
}
