//! Panel: the assembled multi-symbol, multi-time feature table.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::dataset::frame::SeriesFrame;
use crate::error::{AlphaError, Result};

/// The assembled feature table, keyed by (date, symbol).
///
/// Row order within each symbol follows that symbol's time order; across
/// symbols the order is whatever the assembly input produced, and is only
/// significant right before an optional full-panel shuffle. Key uniqueness
/// is enforced at assembly.
#[derive(Debug, Clone)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<(String, Vec<f64>)>,
    index: HashMap<String, usize>,
    feature_names: Vec<String>,
    label_name: Option<String>,
}

impl Panel {
    /// Concatenate per-symbol frames into a panel.
    ///
    /// Frames with zero rows are skipped with a warning. Every frame must
    /// carry the same column layout, and the declared feature/label columns
    /// must exist in that layout; violations are schema errors. Duplicate
    /// (date, symbol) keys are an integrity error.
    pub fn assemble(
        frames: Vec<SeriesFrame>,
        feature_names: Vec<String>,
        label_name: Option<String>,
    ) -> Result<Panel> {
        let frames: Vec<SeriesFrame> = frames
            .into_iter()
            .filter(|frame| {
                if frame.is_empty() {
                    warn!("symbol {} produced zero feature rows, skipping", frame.symbol());
                    false
                } else {
                    true
                }
            })
            .collect();

        let first = frames.first().ok_or_else(|| {
            AlphaError::EmptyDataset("no symbol produced any feature rows".to_string())
        })?;
        let layout: Vec<String> = first
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        for name in feature_names.iter().chain(label_name.iter()) {
            if !layout.iter().any(|c| c == name) {
                return Err(AlphaError::SchemaMismatch(format!(
                    "declared column '{}' is absent from the frame layout",
                    name
                )));
            }
        }

        let total: usize = frames.iter().map(|f| f.len()).sum();
        let mut dates = Vec::with_capacity(total);
        let mut symbols = Vec::with_capacity(total);
        let mut columns: Vec<(String, Vec<f64>)> = layout
            .iter()
            .map(|name| (name.clone(), Vec::with_capacity(total)))
            .collect();

        let mut seen: HashSet<(NaiveDate, String)> = HashSet::with_capacity(total);
        for frame in &frames {
            let names = frame.column_names();
            if names != layout.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(AlphaError::SchemaMismatch(format!(
                    "symbol {} column layout {:?} differs from {:?}",
                    frame.symbol(),
                    names,
                    layout
                )));
            }
            for &date in frame.dates() {
                if !seen.insert((date, frame.symbol().to_string())) {
                    return Err(AlphaError::Integrity(format!(
                        "duplicate key ({}, {})",
                        date,
                        frame.symbol()
                    )));
                }
                dates.push(date);
                symbols.push(frame.symbol().to_string());
            }
            for (slot, column) in columns.iter_mut().zip(frame.columns()) {
                slot.1.extend_from_slice(&column.values);
            }
        }

        info!("assembled panel: {} symbols, {} rows", frames.len(), total);

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Ok(Panel {
            dates,
            symbols,
            columns,
            index,
            feature_names,
            label_name,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Feature column names in handler declaration order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn label_name(&self) -> Option<&str> {
        self.label_name.as_deref()
    }

    /// Column names in layout order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].1.as_slice())
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        let i = *self.index.get(name)?;
        Some(&mut self.columns[i].1)
    }

    /// Append a full-length column (e.g. model predictions).
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(AlphaError::SchemaMismatch(format!(
                "column '{}' has {} values, panel has {} rows",
                name,
                values.len(),
                self.len()
            )));
        }
        if self.index.contains_key(name) {
            return Err(AlphaError::SchemaMismatch(format!(
                "duplicate column '{}'",
                name
            )));
        }
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push((name.to_string(), values));
        Ok(())
    }

    /// Uniform random permutation of row order. Applied only after all
    /// per-symbol computation has completed.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.shuffle(rng);
        let dates = perm.iter().map(|&i| self.dates[i]).collect();
        self.dates = dates;
        let symbols = perm.iter().map(|&i| self.symbols[i].clone()).collect();
        self.symbols = symbols;
        for (_, values) in &mut self.columns {
            let permuted = perm.iter().map(|&i| values[i]).collect();
            *values = permuted;
        }
    }

    /// Read-only view of rows whose date falls within the inclusive
    /// `[start, end]` range; either bound may be open. An empty
    /// intersection yields a zero-row view.
    pub fn slice(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PanelView<'_> {
        let rows = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, &d)| start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e))
            .map(|(i, _)| i)
            .collect();
        PanelView { panel: self, rows }
    }

    /// One view per `[start, end]` pair. Ranges may overlap; no ordering
    /// or disjointness is enforced.
    pub fn split(&self, ranges: &[(NaiveDate, NaiveDate)]) -> Vec<PanelView<'_>> {
        ranges
            .iter()
            .map(|&(start, end)| self.slice(Some(start), Some(end)))
            .collect()
    }

    /// Write one CSV per symbol under `output_dir`, missing values
    /// rendered as the literal `NaN`.
    pub fn dump(&self, output_dir: &Path) -> Result<()> {
        fs::create_dir_all(output_dir)?;

        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (row, symbol) in self.symbols.iter().enumerate() {
            groups
                .entry(symbol.as_str())
                .or_insert_with(|| {
                    order.push(symbol.as_str());
                    Vec::new()
                })
                .push(row);
        }

        for symbol in order {
            let path = output_dir.join(format!("{}.csv", symbol));
            let mut writer = csv::Writer::from_path(&path)?;
            let mut header = vec!["Date".to_string(), "Symbol".to_string()];
            header.extend(self.columns.iter().map(|(name, _)| name.clone()));
            writer.write_record(&header)?;

            for &row in &groups[symbol] {
                let mut record = vec![
                    self.dates[row].format("%Y-%m-%d").to_string(),
                    symbol.to_string(),
                ];
                record.extend(self.columns.iter().map(|(_, values)| values[row].to_string()));
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

/// Read-only time-sliced view over a panel.
///
/// A view borrows its parent and holds only row indices; feature and label
/// metadata are inherited through the borrow rather than copied. Use
/// [`PanelView::to_panel`] when an owned copy is explicitly wanted.
#[derive(Debug, Clone)]
pub struct PanelView<'a> {
    panel: &'a Panel,
    rows: Vec<usize>,
}

impl<'a> PanelView<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn date(&self, row: usize) -> NaiveDate {
        self.panel.dates[self.rows[row]]
    }

    pub fn symbol(&self, row: usize) -> &str {
        &self.panel.symbols[self.rows[row]]
    }

    pub fn feature_names(&self) -> &[String] {
        self.panel.feature_names()
    }

    pub fn label_name(&self) -> Option<&str> {
        self.panel.label_name()
    }

    /// Copy one column's values in view order.
    pub fn column_values(&self, name: &str) -> Result<Vec<f64>> {
        let values = self.panel.column(name).ok_or_else(|| {
            AlphaError::SchemaMismatch(format!("no column '{}' in panel", name))
        })?;
        Ok(self.rows.iter().map(|&i| values[i]).collect())
    }

    /// Row-major feature matrix in declared feature order.
    pub fn feature_matrix(&self) -> Result<Vec<Vec<f64>>> {
        let columns: Vec<&[f64]> = self
            .panel
            .feature_names()
            .iter()
            .map(|name| {
                self.panel.column(name).ok_or_else(|| {
                    AlphaError::SchemaMismatch(format!("no column '{}' in panel", name))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self
            .rows
            .iter()
            .map(|&i| columns.iter().map(|col| col[i]).collect())
            .collect())
    }

    /// Label values in view order.
    pub fn label_values(&self) -> Result<Vec<f64>> {
        let name = self.panel.label_name().ok_or_else(|| {
            AlphaError::SchemaMismatch("panel has no label column".to_string())
        })?;
        self.column_values(name)
    }

    /// Materialize the view as an owned panel (explicit copy).
    pub fn to_panel(&self) -> Panel {
        Panel {
            dates: self.rows.iter().map(|&i| self.panel.dates[i]).collect(),
            symbols: self.rows.iter().map(|&i| self.panel.symbols[i].clone()).collect(),
            columns: self
                .panel
                .columns
                .iter()
                .map(|(name, values)| {
                    (name.clone(), self.rows.iter().map(|&i| values[i]).collect())
                })
                .collect(),
            index: self.panel.index.clone(),
            feature_names: self.panel.feature_names.clone(),
            label_name: self.panel.label_name.clone(),
        }
    }
}
