//! Columnar frame holding one symbol's time-ordered rows.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{AlphaError, Result};

/// A named column of f64 values. Missing values are `f64::NAN`.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// One symbol's rows in columnar form, sorted ascending by date.
///
/// All numeric fields (OHLCV, adjustment factor, pass-through auxiliary
/// columns, computed indicators, label) live in named f64 columns; the
/// date axis is kept separately. Rows from different symbols never share
/// a frame.
#[derive(Debug, Clone)]
pub struct SeriesFrame {
    symbol: String,
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl SeriesFrame {
    /// Create an empty frame for a symbol with a fixed date axis.
    pub fn new(symbol: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        Self {
            symbol: symbol.into(),
            dates,
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Access a column's values by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].values.as_slice())
    }

    /// Append a new column. The column length must match the row count and
    /// the name must be unused.
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.dates.len() {
            return Err(AlphaError::SchemaMismatch(format!(
                "column '{}' has {} values, frame '{}' has {} rows",
                name,
                values.len(),
                self.symbol,
                self.dates.len()
            )));
        }
        if self.index.contains_key(name) {
            return Err(AlphaError::SchemaMismatch(format!(
                "duplicate column '{}' in frame '{}'",
                name, self.symbol
            )));
        }
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push(Column {
            name: name.to_string(),
            values,
        });
        Ok(())
    }

    /// Keep only rows where `keep` is true. `keep` must cover every row.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.dates.len());
        let mut it = keep.iter();
        self.dates.retain(|_| *it.next().unwrap());
        for column in &mut self.columns {
            let mut it = keep.iter();
            column.values.retain(|_| *it.next().unwrap());
        }
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(days: &[u32]) -> Vec<NaiveDate> {
        days.iter()
            .map(|&d| NaiveDate::from_ymd_opt(2021, 1, d).unwrap())
            .collect()
    }

    #[test]
    fn test_add_and_access_column() {
        let mut frame = SeriesFrame::new("AAA", dates(&[1, 2, 3]));
        frame.add_column("Close", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(frame.column("Close").unwrap(), &[1.0, 2.0, 3.0]);
        assert!(frame.column("Open").is_none());
    }

    #[test]
    fn test_add_column_length_mismatch() {
        let mut frame = SeriesFrame::new("AAA", dates(&[1, 2, 3]));
        let result = frame.add_column("Close", vec![1.0]);
        assert!(matches!(result, Err(AlphaError::SchemaMismatch(_))));
    }

    #[test]
    fn test_add_column_duplicate_name() {
        let mut frame = SeriesFrame::new("AAA", dates(&[1]));
        frame.add_column("Close", vec![1.0]).unwrap();
        let result = frame.add_column("Close", vec![2.0]);
        assert!(matches!(result, Err(AlphaError::SchemaMismatch(_))));
    }

    #[test]
    fn test_retain_rows() {
        let mut frame = SeriesFrame::new("AAA", dates(&[1, 2, 3, 4]));
        frame.add_column("Close", vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        frame.retain_rows(&[true, false, true, false]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column("Close").unwrap(), &[1.0, 3.0]);
        assert_eq!(frame.dates(), dates(&[1, 3]).as_slice());
    }
}
