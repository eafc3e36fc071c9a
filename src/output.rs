use anyhow::{Context, Result, bail};
use chrono::Local;
use csv::{ReaderBuilder, WriterBuilder};
use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::indicators::standard_columns;
use crate::labels::field_labels;
use crate::table::{DATE_COL, Frame, SYMBOL_COL};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Write `frame` as the two-header CSV (names, then Chinese labels), atomically.
///
/// Columns follow the canonical order; unknown extra columns go last.
/// Returns the number of data rows written.
pub fn write_output(frame: &Frame, path: &Path) -> Result<usize> {
    let frame = frame.reorder(&standard_columns());
    let labels = field_labels(&frame.columns);

    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent).ok();
    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let f = tmp.as_file_mut();
        f.write_all(UTF8_BOM)?;
        let mut wtr = WriterBuilder::new().flexible(false).from_writer(f);
        wtr.write_record(&frame.columns)?;
        wtr.write_record(&labels)?;
        for row in &frame.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("write {}", path.display()))?;

    info!(
        "wrote {} ({} rows, {} columns)",
        path.display(),
        frame.len(),
        frame.columns.len()
    );
    Ok(frame.len())
}

/// Read a file written by [`write_output`]: names row, skipped label row, data rows.
pub fn read_output(path: &Path) -> Result<Frame> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);
    let mut records = rdr.records();

    let Some(header) = records.next() else {
        return Ok(Frame::default());
    };
    let columns: Vec<String> = header?.iter().map(|s| s.trim().to_string()).collect();
    let width = columns.len();
    let mut frame = Frame::new(columns);

    for record in records.skip(1) {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        frame.rows.push(row);
    }
    Ok(frame)
}

/// Copy `path` to `backup_dir/backup_<YYYYMMDD_HHMMSS>_<name>` if it exists.
///
/// A failed copy is logged and reported as `None`; it never blocks the write.
pub fn backup_output(path: &Path, backup_dir: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let target = backup_dir.join(format!("backup_{}_{}", stamp, name));

    let copied = fs::create_dir_all(backup_dir).and_then(|_| fs::copy(path, &target));
    match copied {
        Ok(_) => {
            info!("backed up {} -> {}", path.display(), target.display());
            Some(target)
        }
        Err(e) => {
            error!("backup of {} failed: {}", path.display(), e);
            None
        }
    }
}

/// Combine freshly computed rows with the previous output file.
///
/// New rows replace old rows with the same `Symbol_Date` key. If either side
/// lacks the key columns the previous data is returned untouched. On any read
/// or merge error the previous file is re-read and returned when non-empty,
/// otherwise the new rows are.
pub fn merge_with_existing(new: Frame, path: &Path) -> Frame {
    if !path.exists() {
        return new;
    }
    match try_merge(&new, path) {
        Ok(merged) => merged,
        Err(e) => {
            error!("merge with {} failed: {:#}", path.display(), e);
            match read_output(path) {
                Ok(old) if !old.is_empty() => {
                    warn!("keeping previous output ({} rows)", old.len());
                    old
                }
                _ => new,
            }
        }
    }
}

fn try_merge(new: &Frame, path: &Path) -> Result<Frame> {
    let existing = read_output(path)?;
    info!("existing rows: {}, new rows: {}", existing.len(), new.len());

    let required = [SYMBOL_COL, DATE_COL];
    let mut missing = Vec::new();
    missing.extend(existing.missing_columns(&required).into_iter().map(|c| format!("existing: {}", c)));
    missing.extend(new.missing_columns(&required).into_iter().map(|c| format!("new: {}", c)));
    if !missing.is_empty() {
        error!("cannot merge, missing key columns ({})", missing.join(", "));
        warn!("keeping previous output unchanged");
        return Ok(existing);
    }

    let (Some(old_keys), Some(new_keys)) = (existing.composite_keys(), new.composite_keys()) else {
        bail!("key columns disappeared during merge");
    };
    let new_keys: HashSet<String> = new_keys.into_iter().collect();

    let mut kept = Frame::new(existing.columns.clone());
    let mut replaced = 0usize;
    for (row, key) in existing.rows.into_iter().zip(old_keys) {
        if new_keys.contains(&key) {
            replaced += 1;
        } else {
            kept.rows.push(row);
        }
    }
    let kept_rows = kept.len();

    let mut merged = Frame::concat(vec![kept, new.clone()]);
    merged.sort_by_date_symbol();
    info!(
        "merged: {} new, {} replaced, {} kept, {} total",
        new.len(),
        replaced,
        kept_rows,
        merged.len()
    );
    Ok(merged)
}

/// `backup_*.csv` files in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut backups: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("backup_") && n.ends_with(".csv"))
        })
        .collect();
    backups.sort();
    backups.reverse();
    Ok(backups)
}

pub fn restore_backup(backup: &Path, output: &Path) -> Result<()> {
    if !backup.exists() {
        bail!("backup file {} does not exist", backup.display());
    }
    fs::copy(backup, output)
        .with_context(|| format!("restore {} -> {}", backup.display(), output.display()))?;
    info!("restored {} -> {}", backup.display(), output.display());
    Ok(())
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
    fn write_read_keeps_columns_rows_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let f = frame(
            &["Symbol", "Date", "Close", "RSI_14", "Custom"],
            &[&["AAA", "2024-01-02", "1.5", "", "x"], &["AAA", "2024-01-03", "1.6", "55.1", ""]],
        );
        assert_eq!(write_output(&f, &path).unwrap(), 2);

        let raw = fs::read(&path).unwrap();
        assert!(raw.starts_with(UTF8_BOM));
        let text = String::from_utf8(raw[3..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "Date,Symbol,Close,RSI_14,Custom");
        assert_eq!(lines.next().unwrap(), "日期,股票代码,收盘价,14日相对强弱指数,Custom");

        let back = read_output(&path).unwrap();
        assert_eq!(back.columns, vec!["Date", "Symbol", "Close", "RSI_14", "Custom"]);
        assert_eq!(back.len(), 2);
        assert_eq!(back.cell(0, "RSI_14"), Some(""));
        assert_eq!(back.cell(1, "RSI_14"), Some("55.1"));
    }

    #[test]
    fn new_rows_win_on_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let old = frame(
            &["Date", "Symbol", "Close"],
            &[&["2024-01-01", "AAA", "1"], &["2024-01-02", "AAA", "2"], &["2024-01-01", "BBB", "7"]],
        );
        write_output(&old, &path).unwrap();

        let new = frame(&["Date", "Symbol", "Close"], &[&["2024-01-02", "AAA", "20"]]);
        let merged = merge_with_existing(new, &path);
        assert_eq!(merged.len(), 3);
        let keys = merged.composite_keys().unwrap();
        assert_eq!(keys, vec!["AAA_2024-01-01", "BBB_2024-01-01", "AAA_2024-01-02"]);
        assert_eq!(merged.cell(2, "Close"), Some("20"));
    }

    #[test]
    fn malformed_previous_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "Symbol,Close\nlabel,label\nAAA,1\nAAA,2\n").unwrap();

        let new = frame(&["Date", "Symbol", "Close"], &[&["2024-01-02", "BBB", "3"]]);
        let merged = merge_with_existing(new, &path);
        assert_eq!(merged.columns, vec!["Symbol", "Close"]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn missing_previous_file_returns_new() {
        let dir = tempfile::tempdir().unwrap();
        let new = frame(&["Date", "Symbol"], &[&["2024-01-02", "BBB"]]);
        let merged = merge_with_existing(new.clone(), &dir.path().join("none.csv"));
        assert_eq!(merged, new);
    }

    #[test]
    fn backup_is_byte_identical_and_listed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let backups = dir.path().join("backups");
        assert!(backup_output(&path, &backups).is_none());

        fs::write(&path, "Date,Symbol\n日期,股票代码\n2024-01-01,AAA\n").unwrap();
        let b = backup_output(&path, &backups).unwrap();
        assert_eq!(fs::read(&b).unwrap(), fs::read(&path).unwrap());
        let name = b.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("backup_") && name.ends_with("_out.csv"));

        fs::write(backups.join("backup_20000101_000000_out.csv"), "old").unwrap();
        fs::write(backups.join("notes.txt"), "x").unwrap();
        let listed = list_backups(&backups).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], b);
    }

    #[test]
    fn restore_copies_backup_over_output() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup_20240101_000000_out.csv");
        let out = dir.path().join("out.csv");
        fs::write(&backup, "restored").unwrap();
        fs::write(&out, "current").unwrap();
        restore_backup(&backup, &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "restored");
        assert!(restore_backup(&dir.path().join("missing.csv"), &out).is_err());
    }
}
