//! Loaders for symbol universes and per-symbol raw series.
//!
//! Universe files live under `<data_dir>/instruments/`, either as a
//! line-oriented `<name>.txt` (first whitespace-delimited token per line)
//! or a tabular `<name>.csv` with `Symbol` and `List_date` columns. Raw
//! series live under `<data_dir>/features/<symbol>.csv`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::dataset::frame::SeriesFrame;
use crate::dataset::utility::to_date;
use crate::error::{AlphaError, Result};

/// Load a line-oriented symbol universe. Missing files are a
/// configuration error.
pub fn load_universe(data_dir: &Path, name: &str) -> Result<Vec<String>> {
    let path = data_dir.join("instruments").join(format!("{}.txt", name));
    if !path.exists() {
        return Err(AlphaError::Configuration(format!(
            "universe file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| token.to_string())
        .collect())
}

/// Load tabular universes and keep symbols whose listing age, measured
/// from today, exceeds `min_listing_days`.
///
/// `instruments` is a comma-separated set of universe names; symbols are
/// deduplicated across universes and returned in sorted order.
pub fn load_symbols(
    data_dir: &Path,
    instruments: &str,
    min_listing_days: i64,
) -> Result<Vec<(String, NaiveDate)>> {
    let today = Utc::now().date_naive();
    let mut symbols = BTreeSet::new();

    for name in instruments.split(',').map(str::trim) {
        let path = data_dir.join("instruments").join(format!("{}.csv", name));
        if !path.exists() {
            return Err(AlphaError::Configuration(format!(
                "universe file not found: {}",
                path.display()
            )));
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        let symbol_idx = column_index(&headers, "Symbol", &path)?;
        let date_idx = column_index(&headers, "List_date", &path)?;

        for record in reader.records() {
            let record = record?;
            let symbol = record.get(symbol_idx).unwrap_or("").to_string();
            let list_date = match record.get(date_idx).map(to_date) {
                Some(Ok(d)) => d,
                _ => continue,
            };
            if (today - list_date).num_days() > min_listing_days {
                symbols.insert((symbol, list_date));
            }
        }
    }

    Ok(symbols.into_iter().collect())
}

/// Resolve the symbol list for a comma-separated universe set, preferring
/// the tabular form (with listing-age filtering) and falling back to the
/// line-oriented form per universe name.
pub fn resolve_symbols(
    data_dir: &Path,
    instruments: &str,
    min_listing_days: i64,
) -> Result<Vec<String>> {
    let mut symbols = BTreeSet::new();
    for name in instruments.split(',').map(str::trim) {
        let csv_path = data_dir.join("instruments").join(format!("{}.csv", name));
        if csv_path.exists() {
            for (symbol, _) in load_symbols(data_dir, name, min_listing_days)? {
                symbols.insert(symbol);
            }
        } else {
            for symbol in load_universe(data_dir, name)? {
                symbols.insert(symbol);
            }
        }
    }
    Ok(symbols.into_iter().collect())
}

/// Load one symbol's raw rows, restricted to `[start, end]` and sorted
/// ascending by date.
///
/// Returns `Ok(None)` when the source file does not exist, cannot be
/// parsed, or holds fewer than `min_trade_days` rows after filtering.
/// Callers skip absent symbols; absence is not an error.
pub fn load_features(
    data_dir: &Path,
    symbol: &str,
    start_time: Option<NaiveDate>,
    end_time: Option<NaiveDate>,
    min_trade_days: usize,
) -> Result<Option<SeriesFrame>> {
    let path = data_dir.join("features").join(format!("{}.csv", symbol));
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(&path)?;
    let headers = reader.headers()?.clone();
    let date_idx = match headers.iter().position(|h| h == "Date") {
        Some(i) => i,
        None => {
            warn!("{}: no Date column, skipping", path.display());
            return Ok(None);
        }
    };
    let value_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date = match record.get(date_idx).map(to_date) {
            Some(Ok(d)) => d,
            _ => {
                warn!("{}: unparseable date, skipping symbol", path.display());
                return Ok(None);
            }
        };
        if let Some(start) = start_time {
            if date < start {
                continue;
            }
        }
        if let Some(end) = end_time {
            if date > end {
                continue;
            }
        }
        let values: Vec<f64> = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(_, v)| v.parse::<f64>().unwrap_or(f64::NAN))
            .collect();
        rows.push((date, values));
    }

    if rows.len() < min_trade_days {
        return Ok(None);
    }
    rows.sort_by_key(|(date, _)| *date);

    let dates: Vec<NaiveDate> = rows.iter().map(|(date, _)| *date).collect();
    let mut frame = SeriesFrame::new(symbol, dates);
    for (col, name) in value_names.iter().enumerate() {
        let values: Vec<f64> = rows.iter().map(|(_, row)| row[col]).collect();
        frame.add_column(name, values)?;
    }
    Ok(Some(frame))
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        AlphaError::SchemaMismatch(format!(
            "{}: missing required column '{}'",
            path.display(),
            name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_universe_first_token() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "instruments/all.txt", "AAA 2010-01-01\nBBB\n");
        let symbols = load_universe(dir.path(), "all").unwrap();
        assert_eq!(symbols, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_load_universe_missing_is_configuration_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_universe(dir.path(), "nope"),
            Err(AlphaError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_symbols_filters_by_listing_age() {
        let dir = tempdir().unwrap();
        let recent = Utc::now().date_naive();
        write_file(
            dir.path(),
            "instruments/all.csv",
            &format!("Symbol,List_date\nOLD,2000-01-01\nNEW,{}\n", recent),
        );
        let symbols = load_symbols(dir.path(), "all", 365).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].0, "OLD");
    }

    #[test]
    fn test_load_symbols_deduplicates_across_universes() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "instruments/a.csv",
            "Symbol,List_date\nAAA,2000-01-01\n",
        );
        write_file(
            dir.path(),
            "instruments/b.csv",
            "Symbol,List_date\nAAA,2000-01-01\nBBB,2001-01-01\n",
        );
        let symbols = load_symbols(dir.path(), "a,b", 365).unwrap();
        let names: Vec<&str> = symbols.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_load_features_absent_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_features(dir.path(), "AAA", None, None, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_features_sorts_and_filters() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "features/AAA.csv",
            "Date,Open,High,Low,Close,Volume,Adj_factor\n\
             2021-01-03,1,2,0.5,1.5,100,1\n\
             2021-01-01,1,2,0.5,1.0,100,1\n\
             2021-01-02,1,2,0.5,1.2,100,1\n\
             2021-01-04,1,2,0.5,1.8,100,1\n",
        );
        let start = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();
        let frame = load_features(dir.path(), "AAA", Some(start), None, 1)
            .unwrap()
            .unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column("Close").unwrap(), &[1.2, 1.5, 1.8]);
        assert!(frame.dates().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_load_features_min_trade_days() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "features/AAA.csv",
            "Date,Close\n2021-01-01,1.0\n2021-01-02,1.1\n",
        );
        assert!(load_features(dir.path(), "AAA", None, None, 3)
            .unwrap()
            .is_none());
        assert!(load_features(dir.path(), "AAA", None, None, 2)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_load_features_unparseable_cell_is_nan() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "features/AAA.csv",
            "Date,Close,Total_mv\n2021-01-01,1.0,\n2021-01-02,1.1,3.5\n",
        );
        let frame = load_features(dir.path(), "AAA", None, None, 1)
            .unwrap()
            .unwrap();
        let mv = frame.column("Total_mv").unwrap();
        assert!(mv[0].is_nan());
        assert_eq!(mv[1], 3.5);
    }
}
