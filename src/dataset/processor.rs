//! Cross-sectional processors with persistable fitted parameters.
//!
//! Each step implements the [`Processor`] capability set: `fit` learns
//! per-date statistics from a reference panel, `transform` applies them to
//! any panel and returns a new panel, and fitted state round-trips through
//! [`ProcessorParams`] so inference can run without re-fitting. All
//! statistics are cross-sectional: grouped by distinct date, across the
//! symbols present at that date.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::panel::Panel;
use crate::error::{AlphaError, Result};

/// Normal-consistent MAD multiplier.
const MAD_SCALE: f64 = 1.4826;
/// Guard against zero spread.
const SCALE_EPS: f64 = 1e-12;

/// Capability set shared by all pipeline steps.
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Learn processing parameters from a reference panel.
    fn fit(&mut self, panel: &Panel) -> Result<()>;

    /// Apply the fitted parameters, returning a new panel. The input is
    /// never mutated.
    fn transform(&self, panel: &Panel) -> Result<Panel>;

    /// Export fitted state for persistence.
    fn params(&self) -> Result<ProcessorParams>;

    /// Restore fitted state. Parameters recorded for a different step kind
    /// or column set are a schema mismatch.
    fn load_params(&mut self, params: ProcessorParams) -> Result<()>;
}

/// Serialized fitted state, tagged by step kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProcessorParams {
    #[serde(rename = "cs_zscore_norm")]
    ZScore(ZScoreParams),
    #[serde(rename = "cs_fillna")]
    Fillna(FillnaParams),
    #[serde(rename = "cs_filter_outlier")]
    Outlier(OutlierParams),
    #[serde(rename = "cs_neutralize")]
    Neutralize(NeutralizeParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreParams {
    pub cols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// Per date, per column.
    pub center: Vec<Vec<f64>>,
    pub scale: Vec<Vec<f64>>,
    /// Whole-panel statistics for dates unseen at fit time.
    pub fallback_center: Vec<f64>,
    pub fallback_scale: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillnaParams {
    pub cols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub median: Vec<Vec<f64>>,
    pub fallback_median: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierParams {
    pub cols: Vec<String>,
    pub method: OutlierMethod,
    pub dates: Vec<NaiveDate>,
    pub lower: Vec<Vec<f64>>,
    pub upper: Vec<Vec<f64>>,
    pub fallback_lower: Vec<f64>,
    pub fallback_upper: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeutralizeParams {
    pub cols: Vec<String>,
    pub industry_col: String,
    pub cap_col: String,
}

/// Outlier bound selection for [`CSFilterOutlier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Clip to the `[p, 1-p]` cross-sectional quantile bounds.
    Percentile(f64),
    /// Clip to the fixed `[-a, a]` interval.
    Absolute(f64),
}

/// Robust cross-sectional z-score normalization.
///
/// Per date and column: `center = median(x)`, `scale = MAD(x) * 1.4826 + ε`,
/// then `(x - center) / scale`, optionally clipped to `[-3, 3]`.
pub struct CSZScoreNorm {
    cols: Vec<String>,
    clip_outlier: bool,
    params: Option<ZScoreParams>,
}

impl CSZScoreNorm {
    pub fn new(cols: Vec<String>, clip_outlier: bool) -> Self {
        Self {
            cols,
            clip_outlier,
            params: None,
        }
    }
}

impl Processor for CSZScoreNorm {
    fn name(&self) -> &'static str {
        "cs_zscore_norm"
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let columns = resolve_columns(panel, &self.cols)?;
        let groups = group_by_date(panel);

        let fallback: Vec<(f64, f64)> = columns
            .iter()
            .map(|values| robust_stats(values.iter().copied()))
            .collect();
        let fallback_center: Vec<f64> = fallback.iter().map(|s| s.0).collect();
        let fallback_scale: Vec<f64> = fallback.iter().map(|s| s.1).collect();

        let mut dates = Vec::with_capacity(groups.len());
        let mut center = Vec::with_capacity(groups.len());
        let mut scale = Vec::with_capacity(groups.len());
        for (date, rows) in &groups {
            let mut c_row = Vec::with_capacity(columns.len());
            let mut s_row = Vec::with_capacity(columns.len());
            for (j, values) in columns.iter().enumerate() {
                let (c, s) = robust_stats(rows.iter().map(|&i| values[i]));
                c_row.push(if c.is_finite() { c } else { fallback_center[j] });
                s_row.push(if s.is_finite() { s } else { fallback_scale[j] });
            }
            dates.push(*date);
            center.push(c_row);
            scale.push(s_row);
        }

        self.params = Some(ZScoreParams {
            cols: self.cols.clone(),
            dates,
            center,
            scale,
            fallback_center,
            fallback_scale,
        });
        Ok(())
    }

    fn transform(&self, panel: &Panel) -> Result<Panel> {
        let params = self.params.as_ref().ok_or_else(|| {
            AlphaError::Configuration("cs_zscore_norm: transform called before fit".to_string())
        })?;
        resolve_columns(panel, &self.cols)?;

        let date_slot: HashMap<NaiveDate, usize> = params
            .dates
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();
        let dates = panel.dates().to_vec();

        let mut out = panel.clone();
        for (j, col) in self.cols.iter().enumerate() {
            let values = out.column_mut(col).unwrap();
            for (i, value) in values.iter_mut().enumerate() {
                let (center, scale) = match date_slot.get(&dates[i]) {
                    Some(&slot) => (params.center[slot][j], params.scale[slot][j]),
                    None => (params.fallback_center[j], params.fallback_scale[j]),
                };
                let mut z = (*value - center) / scale;
                if self.clip_outlier {
                    z = z.clamp(-3.0, 3.0);
                }
                *value = z;
            }
        }
        Ok(out)
    }

    fn params(&self) -> Result<ProcessorParams> {
        self.params
            .clone()
            .map(ProcessorParams::ZScore)
            .ok_or_else(|| AlphaError::Configuration("cs_zscore_norm: not fitted".to_string()))
    }

    fn load_params(&mut self, params: ProcessorParams) -> Result<()> {
        match params {
            ProcessorParams::ZScore(p) if p.cols == self.cols => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(schema_mismatch(self.name(), &self.cols, &other)),
        }
    }
}

/// Cross-sectional median imputation of missing values.
pub struct CSFillna {
    cols: Vec<String>,
    params: Option<FillnaParams>,
}

impl CSFillna {
    pub fn new(cols: Vec<String>) -> Self {
        Self { cols, params: None }
    }
}

impl Processor for CSFillna {
    fn name(&self) -> &'static str {
        "cs_fillna"
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let columns = resolve_columns(panel, &self.cols)?;
        let groups = group_by_date(panel);

        let fallback_median: Vec<f64> = columns
            .iter()
            .map(|values| {
                let m = nan_median(values.iter().copied());
                if m.is_finite() {
                    m
                } else {
                    0.0
                }
            })
            .collect();

        let mut dates = Vec::with_capacity(groups.len());
        let mut median = Vec::with_capacity(groups.len());
        for (date, rows) in &groups {
            let row: Vec<f64> = columns
                .iter()
                .enumerate()
                .map(|(j, values)| {
                    let m = nan_median(rows.iter().map(|&i| values[i]));
                    if m.is_finite() {
                        m
                    } else {
                        fallback_median[j]
                    }
                })
                .collect();
            dates.push(*date);
            median.push(row);
        }

        self.params = Some(FillnaParams {
            cols: self.cols.clone(),
            dates,
            median,
            fallback_median,
        });
        Ok(())
    }

    fn transform(&self, panel: &Panel) -> Result<Panel> {
        let params = self.params.as_ref().ok_or_else(|| {
            AlphaError::Configuration("cs_fillna: transform called before fit".to_string())
        })?;
        resolve_columns(panel, &self.cols)?;

        let date_slot: HashMap<NaiveDate, usize> = params
            .dates
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();
        let dates = panel.dates().to_vec();

        let mut out = panel.clone();
        for (j, col) in self.cols.iter().enumerate() {
            let values = out.column_mut(col).unwrap();
            for (i, value) in values.iter_mut().enumerate() {
                if value.is_nan() {
                    *value = match date_slot.get(&dates[i]) {
                        Some(&slot) => params.median[slot][j],
                        None => params.fallback_median[j],
                    };
                }
            }
        }
        Ok(out)
    }

    fn params(&self) -> Result<ProcessorParams> {
        self.params
            .clone()
            .map(ProcessorParams::Fillna)
            .ok_or_else(|| AlphaError::Configuration("cs_fillna: not fitted".to_string()))
    }

    fn load_params(&mut self, params: ProcessorParams) -> Result<()> {
        match params {
            ProcessorParams::Fillna(p) if p.cols == self.cols => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(schema_mismatch(self.name(), &self.cols, &other)),
        }
    }
}

/// Cross-sectional outlier clipping, applied before normalization.
pub struct CSFilterOutlier {
    cols: Vec<String>,
    method: OutlierMethod,
    params: Option<OutlierParams>,
}

impl CSFilterOutlier {
    pub fn new(cols: Vec<String>, method: OutlierMethod) -> Self {
        Self {
            cols,
            method,
            params: None,
        }
    }
}

impl Processor for CSFilterOutlier {
    fn name(&self) -> &'static str {
        "cs_filter_outlier"
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let columns = resolve_columns(panel, &self.cols)?;

        let mut params = OutlierParams {
            cols: self.cols.clone(),
            method: self.method,
            dates: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            fallback_lower: vec![f64::MIN; self.cols.len()],
            fallback_upper: vec![f64::MAX; self.cols.len()],
        };

        if let OutlierMethod::Absolute(bound) = self.method {
            params.fallback_lower = vec![-bound; self.cols.len()];
            params.fallback_upper = vec![bound; self.cols.len()];
            self.params = Some(params);
            return Ok(());
        }

        let p = match self.method {
            OutlierMethod::Percentile(p) => p,
            OutlierMethod::Absolute(_) => unreachable!(),
        };

        for (j, values) in columns.iter().enumerate() {
            let sorted = sorted_finite(values.iter().copied());
            let lo = quantile(&sorted, p);
            let hi = quantile(&sorted, 1.0 - p);
            if lo.is_finite() {
                params.fallback_lower[j] = lo;
            }
            if hi.is_finite() {
                params.fallback_upper[j] = hi;
            }
        }

        for (date, rows) in &group_by_date(panel) {
            let mut lo_row = Vec::with_capacity(columns.len());
            let mut hi_row = Vec::with_capacity(columns.len());
            for (j, values) in columns.iter().enumerate() {
                let sorted = sorted_finite(rows.iter().map(|&i| values[i]));
                let lo = quantile(&sorted, p);
                let hi = quantile(&sorted, 1.0 - p);
                lo_row.push(if lo.is_finite() { lo } else { params.fallback_lower[j] });
                hi_row.push(if hi.is_finite() { hi } else { params.fallback_upper[j] });
            }
            params.dates.push(*date);
            params.lower.push(lo_row);
            params.upper.push(hi_row);
        }

        self.params = Some(params);
        Ok(())
    }

    fn transform(&self, panel: &Panel) -> Result<Panel> {
        let params = self.params.as_ref().ok_or_else(|| {
            AlphaError::Configuration("cs_filter_outlier: transform called before fit".to_string())
        })?;
        resolve_columns(panel, &self.cols)?;

        let date_slot: HashMap<NaiveDate, usize> = params
            .dates
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();
        let dates = panel.dates().to_vec();

        let mut out = panel.clone();
        for (j, col) in self.cols.iter().enumerate() {
            let values = out.column_mut(col).unwrap();
            for (i, value) in values.iter_mut().enumerate() {
                let (lo, hi) = match date_slot.get(&dates[i]) {
                    Some(&slot) => (params.lower[slot][j], params.upper[slot][j]),
                    None => (params.fallback_lower[j], params.fallback_upper[j]),
                };
                *value = value.clamp(lo, hi);
            }
        }
        Ok(out)
    }

    fn params(&self) -> Result<ProcessorParams> {
        self.params
            .clone()
            .map(ProcessorParams::Outlier)
            .ok_or_else(|| AlphaError::Configuration("cs_filter_outlier: not fitted".to_string()))
    }

    fn load_params(&mut self, params: ProcessorParams) -> Result<()> {
        match params {
            ProcessorParams::Outlier(p) if p.cols == self.cols => {
                self.method = p.method;
                self.params = Some(p);
                Ok(())
            }
            other => Err(schema_mismatch(self.name(), &self.cols, &other)),
        }
    }
}

/// Cross-sectional neutralization: residualize target columns against
/// categorical industry membership and a continuous market-cap control.
///
/// Uses within-industry demeaning followed by removal of the pooled cap
/// beta (Frisch-Waugh), per date. A slice with any industry group of fewer
/// than two symbols, or with missing controls, is returned unchanged.
pub struct CSNeutralize {
    cols: Vec<String>,
    industry_col: String,
    cap_col: String,
}

impl CSNeutralize {
    pub fn new(cols: Vec<String>, industry_col: &str, cap_col: &str) -> Self {
        Self {
            cols,
            industry_col: industry_col.to_string(),
            cap_col: cap_col.to_string(),
        }
    }

    fn control_columns(&self) -> Vec<String> {
        let mut all = self.cols.clone();
        all.push(self.industry_col.clone());
        all.push(self.cap_col.clone());
        all
    }
}

impl Processor for CSNeutralize {
    fn name(&self) -> &'static str {
        "cs_neutralize"
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        // stateless across fits: only the column contract is checked
        resolve_columns(panel, &self.control_columns())?;
        Ok(())
    }

    fn transform(&self, panel: &Panel) -> Result<Panel> {
        resolve_columns(panel, &self.control_columns())?;

        let industry = panel.column(&self.industry_col).unwrap().to_vec();
        let cap = panel.column(&self.cap_col).unwrap().to_vec();
        let groups = group_by_date(panel);

        let mut out = panel.clone();
        for (date, rows) in &groups {
            if rows
                .iter()
                .any(|&i| !industry[i].is_finite() || !cap[i].is_finite())
            {
                debug!("neutralize: missing controls at {}, slice unchanged", date);
                continue;
            }

            let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
            for &i in rows {
                members.entry(industry[i].round() as i64).or_default().push(i);
            }
            if members.values().any(|group| group.len() < 2) {
                debug!("neutralize: undersized group at {}, slice unchanged", date);
                continue;
            }

            for col in &self.cols {
                let values = out.column_mut(col).unwrap();

                // within-industry demeaning of target and control, over
                // rows where the target is defined
                let mut demeaned: Vec<(usize, f64, f64)> = Vec::new();
                for group in members.values() {
                    let valid: Vec<usize> = group
                        .iter()
                        .copied()
                        .filter(|&i| values[i].is_finite())
                        .collect();
                    if valid.is_empty() {
                        continue;
                    }
                    let y_mean =
                        valid.iter().map(|&i| values[i]).sum::<f64>() / valid.len() as f64;
                    let c_mean = valid.iter().map(|&i| cap[i]).sum::<f64>() / valid.len() as f64;
                    for &i in &valid {
                        demeaned.push((i, values[i] - y_mean, cap[i] - c_mean));
                    }
                }

                let ss: f64 = demeaned.iter().map(|(_, _, c)| c * c).sum();
                let beta = if ss > SCALE_EPS {
                    demeaned.iter().map(|(_, y, c)| y * c).sum::<f64>() / ss
                } else {
                    0.0
                };
                for (i, y, c) in demeaned {
                    values[i] = y - beta * c;
                }
            }
        }
        Ok(out)
    }

    fn params(&self) -> Result<ProcessorParams> {
        Ok(ProcessorParams::Neutralize(NeutralizeParams {
            cols: self.cols.clone(),
            industry_col: self.industry_col.clone(),
            cap_col: self.cap_col.clone(),
        }))
    }

    fn load_params(&mut self, params: ProcessorParams) -> Result<()> {
        match params {
            ProcessorParams::Neutralize(p)
                if p.cols == self.cols
                    && p.industry_col == self.industry_col
                    && p.cap_col == self.cap_col =>
            {
                Ok(())
            }
            other => Err(schema_mismatch(self.name(), &self.cols, &other)),
        }
    }
}

/// An ordered sequence of processing steps.
///
/// `fit_transform` feeds each step's fit with the output of the previous
/// step's transform: steps compose, they are not independent.
#[derive(Default)]
pub struct ProcessorPipeline {
    steps: Vec<Box<dyn Processor>>,
}

impl ProcessorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Box<dyn Processor>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn fit_transform(&mut self, panel: &Panel) -> Result<Panel> {
        let mut current = panel.clone();
        for step in &mut self.steps {
            step.fit(&current)?;
            current = step.transform(&current)?;
            debug!("fitted and applied {}", step.name());
        }
        Ok(current)
    }

    pub fn transform(&self, panel: &Panel) -> Result<Panel> {
        let mut current = panel.clone();
        for step in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    /// Persist every step's fitted parameters as a JSON array.
    pub fn save_params(&self, path: &Path) -> Result<()> {
        let params: Vec<ProcessorParams> = self
            .steps
            .iter()
            .map(|step| step.params())
            .collect::<Result<_>>()?;
        fs::write(path, serde_json::to_string_pretty(&params)?)?;
        Ok(())
    }

    /// Restore fitted parameters saved by [`ProcessorPipeline::save_params`].
    pub fn load_params(&mut self, path: &Path) -> Result<()> {
        let params: Vec<ProcessorParams> = serde_json::from_str(&fs::read_to_string(path)?)?;
        if params.len() != self.steps.len() {
            return Err(AlphaError::SchemaMismatch(format!(
                "persisted pipeline has {} steps, expected {}",
                params.len(),
                self.steps.len()
            )));
        }
        for (step, p) in self.steps.iter_mut().zip(params) {
            step.load_params(p)?;
        }
        Ok(())
    }
}

fn schema_mismatch(name: &str, cols: &[String], got: &ProcessorParams) -> AlphaError {
    let kind = match got {
        ProcessorParams::ZScore(_) => "cs_zscore_norm",
        ProcessorParams::Fillna(_) => "cs_fillna",
        ProcessorParams::Outlier(_) => "cs_filter_outlier",
        ProcessorParams::Neutralize(_) => "cs_neutralize",
    };
    AlphaError::SchemaMismatch(format!(
        "{} configured for columns {:?} cannot load '{}' parameters",
        name, cols, kind
    ))
}

fn resolve_columns<'a>(panel: &'a Panel, cols: &[String]) -> Result<Vec<&'a [f64]>> {
    cols.iter()
        .map(|name| {
            panel.column(name).ok_or_else(|| {
                AlphaError::SchemaMismatch(format!("no column '{}' in panel", name))
            })
        })
        .collect()
}

fn group_by_date(panel: &Panel) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut groups: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, &date) in panel.dates().iter().enumerate() {
        groups.entry(date).or_default().push(i);
    }
    groups
}

fn sorted_finite(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap());
    out
}

/// Median of the finite values, NaN when none exist.
fn nan_median(values: impl Iterator<Item = f64>) -> f64 {
    let sorted = sorted_finite(values);
    let n = sorted.len();
    if n == 0 {
        f64::NAN
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Robust (median, scaled-MAD) location/spread pair.
fn robust_stats(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let center = nan_median(values.clone());
    let scale = nan_median(values.map(|v| (v - center).abs())) * MAD_SCALE + SCALE_EPS;
    (center, scale)
}

/// Linear-interpolation quantile of a sorted sample, NaN when empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::frame::SeriesFrame;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    /// Panel with `n` symbols over the given days; `value[s][d]` fills the
    /// "x" column, and industry/cap columns are attached when provided.
    fn make_panel(days: &[u32], values: &[Vec<f64>], industry: Option<&[f64]>, cap: Option<&[Vec<f64>]>) -> Panel {
        let mut frames = Vec::new();
        for (s, series) in values.iter().enumerate() {
            let symbol = format!("S{:02}", s);
            let dates: Vec<NaiveDate> = days.iter().map(|&d| date(d)).collect();
            let mut frame = SeriesFrame::new(symbol, dates);
            frame.add_column("x", series.clone()).unwrap();
            if let Some(ind) = industry {
                frame
                    .add_column("Industry_id", vec![ind[s]; days.len()])
                    .unwrap();
            }
            if let Some(cap) = cap {
                frame.add_column("Total_mv", cap[s].clone()).unwrap();
            }
            frames.push(frame);
        }
        Panel::assemble(frames, vec!["x".to_string()], None).unwrap()
    }

    fn collect_by_date(panel: &Panel, col: &str) -> BTreeMap<NaiveDate, Vec<f64>> {
        let values = panel.column(col).unwrap();
        let mut out: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (i, &d) in panel.dates().iter().enumerate() {
            out.entry(d).or_default().push(values[i]);
        }
        out
    }

    #[test]
    fn test_zscore_self_fit_normalizes_each_slice() {
        let values: Vec<Vec<f64>> = (0..7)
            .map(|s| vec![s as f64 * 1.5 + 1.0, s as f64 * -0.7 + 10.0])
            .collect();
        let panel = make_panel(&[1, 2], &values, None, None);

        let mut step = CSZScoreNorm::new(vec!["x".to_string()], false);
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();

        for (_, slice) in collect_by_date(&out, "x") {
            let median = nan_median(slice.iter().copied());
            let mad = nan_median(slice.iter().map(|v| (v - median).abs()));
            assert!(median.abs() < 1e-9);
            assert!((mad * MAD_SCALE - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zscore_clips_to_three() {
        let mut values: Vec<Vec<f64>> = (0..9).map(|s| vec![s as f64]).collect();
        values.push(vec![1000.0]);
        let panel = make_panel(&[1], &values, None, None);

        let mut step = CSZScoreNorm::new(vec!["x".to_string()], true);
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        let max = out
            .column("x")
            .unwrap()
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        assert_eq!(max, 3.0);
    }

    #[test]
    fn test_zscore_nan_passes_through() {
        let values = vec![vec![1.0], vec![2.0], vec![f64::NAN]];
        let panel = make_panel(&[1], &values, None, None);
        let mut step = CSZScoreNorm::new(vec!["x".to_string()], true);
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        assert!(out.column("x").unwrap()[2].is_nan());
    }

    #[test]
    fn test_zscore_params_round_trip_is_bit_identical() {
        let values: Vec<Vec<f64>> = (0..6)
            .map(|s| vec![0.3 * s as f64 + 0.1, -0.9 * s as f64])
            .collect();
        let panel = make_panel(&[1, 2], &values, None, None);

        let mut pipeline = ProcessorPipeline::new();
        pipeline.push(Box::new(CSZScoreNorm::new(vec!["x".to_string()], true)));
        let direct = pipeline.fit_transform(&panel).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processor.json");
        pipeline.save_params(&path).unwrap();

        let mut reloaded = ProcessorPipeline::new();
        reloaded.push(Box::new(CSZScoreNorm::new(vec!["x".to_string()], true)));
        reloaded.load_params(&path).unwrap();
        let replayed = reloaded.transform(&panel).unwrap();

        let a = direct.column("x").unwrap();
        let b = replayed.column("x").unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_zscore_unseen_date_uses_fallback() {
        let values: Vec<Vec<f64>> = (0..5).map(|s| vec![s as f64]).collect();
        let train = make_panel(&[1], &values, None, None);
        let mut step = CSZScoreNorm::new(vec!["x".to_string()], false);
        step.fit(&train).unwrap();

        let future = make_panel(&[9], &values, None, None);
        let out = step.transform(&future).unwrap();
        // same cross-section, so the whole-panel fallback matches the
        // fitted slice statistics
        let expected = step.transform(&train).unwrap();
        assert_eq!(out.column("x").unwrap(), expected.column("x").unwrap());
    }

    #[test]
    fn test_load_params_wrong_cols_is_schema_mismatch() {
        let values: Vec<Vec<f64>> = (0..4).map(|s| vec![s as f64]).collect();
        let panel = make_panel(&[1], &values, None, None);
        let mut fitted = CSZScoreNorm::new(vec!["x".to_string()], true);
        fitted.fit(&panel).unwrap();

        let mut other = CSZScoreNorm::new(vec!["y".to_string()], true);
        let result = other.load_params(fitted.params().unwrap());
        assert!(matches!(result, Err(AlphaError::SchemaMismatch(_))));
    }

    #[test]
    fn test_load_params_wrong_kind_is_schema_mismatch() {
        let values: Vec<Vec<f64>> = (0..4).map(|s| vec![s as f64]).collect();
        let panel = make_panel(&[1], &values, None, None);
        let mut fitted = CSZScoreNorm::new(vec!["x".to_string()], true);
        fitted.fit(&panel).unwrap();

        let mut fillna = CSFillna::new(vec!["x".to_string()]);
        let result = fillna.load_params(fitted.params().unwrap());
        assert!(matches!(result, Err(AlphaError::SchemaMismatch(_))));
    }

    #[test]
    fn test_fillna_uses_slice_median() {
        let values = vec![
            vec![1.0, 10.0],
            vec![3.0, f64::NAN],
            vec![f64::NAN, 30.0],
        ];
        let panel = make_panel(&[1, 2], &values, None, None);
        let mut step = CSFillna::new(vec!["x".to_string()]);
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();

        let by_date = collect_by_date(&out, "x");
        // day 1 slice [1, 3, NaN] -> NaN filled with 2; day 2 slice
        // [10, NaN, 30] -> NaN filled with 20
        assert_eq!(by_date[&date(1)], vec![1.0, 3.0, 2.0]);
        assert_eq!(by_date[&date(2)], vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_outlier_absolute_clips() {
        let values = vec![vec![-5.0], vec![0.5], vec![7.0]];
        let panel = make_panel(&[1], &values, None, None);
        let mut step =
            CSFilterOutlier::new(vec!["x".to_string()], OutlierMethod::Absolute(1.0));
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        assert_eq!(out.column("x").unwrap(), &[-1.0, 0.5, 1.0]);
    }

    #[test]
    fn test_outlier_percentile_bounds_extremes() {
        let values: Vec<Vec<f64>> = (0..11).map(|s| vec![s as f64]).collect();
        let panel = make_panel(&[1], &values, None, None);
        let mut step =
            CSFilterOutlier::new(vec!["x".to_string()], OutlierMethod::Percentile(0.1));
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        let clipped = out.column("x").unwrap();
        assert_eq!(clipped[0], 1.0);
        assert_eq!(clipped[10], 9.0);
        assert_eq!(clipped[5], 5.0);
    }

    #[test]
    fn test_neutralize_small_group_is_noop() {
        // industry 2 has a single member, so the slice stays unchanged
        let values = vec![vec![1.0], vec![2.0], vec![9.0]];
        let industry = [1.0, 1.0, 2.0];
        let cap = vec![vec![10.0], vec![20.0], vec![30.0]];
        let panel = make_panel(&[1], &values, Some(&industry), Some(&cap));
        let mut step = CSNeutralize::new(vec!["x".to_string()], "Industry_id", "Total_mv");
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        assert_eq!(out.column("x").unwrap(), panel.column("x").unwrap());
    }

    #[test]
    fn test_neutralize_removes_industry_means() {
        let values = vec![vec![1.0], vec![3.0], vec![10.0], vec![14.0]];
        let industry = [1.0, 1.0, 2.0, 2.0];
        let cap = vec![vec![5.0], vec![5.0], vec![7.0], vec![7.0]];
        let panel = make_panel(&[1], &values, Some(&industry), Some(&cap));
        let mut step = CSNeutralize::new(vec!["x".to_string()], "Industry_id", "Total_mv");
        step.fit(&panel).unwrap();
        let out = step.transform(&panel).unwrap();
        let x = out.column("x").unwrap();
        // flat cap within groups: residuals are within-industry demeaned
        assert_eq!(x, &[-1.0, 1.0, -2.0, 2.0]);
    }

    #[test]
    fn test_pipeline_steps_compose_in_order() {
        let values = vec![vec![f64::NAN], vec![2.0], vec![4.0], vec![6.0]];
        let panel = make_panel(&[1], &values, None, None);

        let mut pipeline = ProcessorPipeline::new();
        pipeline.push(Box::new(CSFillna::new(vec!["x".to_string()])));
        pipeline.push(Box::new(CSZScoreNorm::new(vec!["x".to_string()], false)));
        let out = pipeline.fit_transform(&panel).unwrap();

        // fillna runs first, so the z-score slice sees no NaN and the
        // imputed row lands on the median
        let x = out.column("x").unwrap();
        assert!(x.iter().all(|v| v.is_finite()));
        let median = nan_median(x.iter().copied());
        assert!(median.abs() < 1e-9);
    }

    #[test]
    fn test_pipeline_length_mismatch_on_load() {
        let values: Vec<Vec<f64>> = (0..4).map(|s| vec![s as f64]).collect();
        let panel = make_panel(&[1], &values, None, None);

        let mut pipeline = ProcessorPipeline::new();
        pipeline.push(Box::new(CSZScoreNorm::new(vec!["x".to_string()], true)));
        pipeline.fit_transform(&panel).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processor.json");
        pipeline.save_params(&path).unwrap();

        let mut two_steps = ProcessorPipeline::new();
        two_steps.push(Box::new(CSFillna::new(vec!["x".to_string()])));
        two_steps.push(Box::new(CSZScoreNorm::new(vec!["x".to_string()], true)));
        assert!(matches!(
            two_steps.load_params(&path),
            Err(AlphaError::SchemaMismatch(_))
        ));
    }
}
