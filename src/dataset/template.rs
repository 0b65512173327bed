//! End-to-end dataset assembly for model training and inference.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::dataset::frame::SeriesFrame;
use crate::dataset::handler::DataHandler;
use crate::dataset::loader;
use crate::dataset::panel::{Panel, PanelView};
use crate::dataset::processor::{
    CSFillna, CSFilterOutlier, CSNeutralize, CSZScoreNorm, OutlierMethod, ProcessorPipeline,
};
use crate::dataset::utility::{to_date_opt, Segment};
use crate::error::{AlphaError, Result};
use crate::setting::DatasetSetting;

/// An assembled panel together with its fitted processor pipeline and
/// named time segments.
pub struct Dataset {
    panel: Panel,
    pipeline: ProcessorPipeline,
    segments: HashMap<Segment, (NaiveDate, NaiveDate)>,
}

impl Dataset {
    /// Assemble a dataset and fit the default processor pipeline on it.
    pub fn build(setting: &DatasetSetting, handler: &dyn DataHandler) -> Result<Self> {
        let pipeline = Self::default_pipeline(setting, handler);
        Self::build_with(setting, handler, pipeline, true)
    }

    /// Assemble a dataset with an explicit pipeline.
    ///
    /// With `fit` false the pipeline must already carry fitted parameters
    /// (freshly loaded via [`ProcessorPipeline::load_params`]), enabling
    /// inference without re-fitting on unavailable future data.
    pub fn build_with(
        setting: &DatasetSetting,
        handler: &dyn DataHandler,
        mut pipeline: ProcessorPipeline,
        fit: bool,
    ) -> Result<Self> {
        let start = to_date_opt(setting.start_time.as_deref())?;
        let end = to_date_opt(setting.end_time.as_deref())?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(AlphaError::Configuration(format!(
                    "invalid time range: {} > {}",
                    s, e
                )));
            }
        }

        let symbols = loader::resolve_symbols(
            &setting.data_dir,
            &setting.instruments,
            setting.min_listing_days,
        )?;
        info!(
            "resolved {} symbols from universe '{}'",
            symbols.len(),
            setting.instruments
        );

        // per-symbol loading and feature computation are independent; a
        // failed symbol is skipped, never fatal for the batch
        let frames: Vec<SeriesFrame> = symbols
            .par_iter()
            .filter_map(|symbol| {
                let loaded = loader::load_features(
                    &setting.data_dir,
                    symbol,
                    start,
                    end,
                    setting.min_periods,
                );
                match loaded {
                    Ok(Some(frame)) => match handler.fetch(frame) {
                        Ok(frame) => Some(frame),
                        Err(e) => {
                            warn!("{}: feature computation failed ({}), skipping", symbol, e);
                            None
                        }
                    },
                    Ok(None) => {
                        debug!("{}: unavailable or insufficient history, skipping", symbol);
                        None
                    }
                    Err(e) => {
                        warn!("{}: load failed ({}), skipping", symbol, e);
                        None
                    }
                }
            })
            .collect();

        if frames.is_empty() {
            return Err(AlphaError::EmptyDataset(format!(
                "no usable symbols in universe '{}'",
                setting.instruments
            )));
        }
        info!("loaded {} symbols to build dataset", frames.len());

        let mut panel = Panel::assemble(
            frames,
            handler.feature_names().to_vec(),
            handler.label_name().map(String::from),
        )?;

        panel = if fit {
            pipeline.fit_transform(&panel)?
        } else {
            pipeline.transform(&panel)?
        };

        // the shuffle is a synchronization barrier: strictly after all
        // per-symbol work and processing
        if setting.shuffle {
            panel.shuffle(&mut rand::rng());
        }

        Ok(Self {
            panel,
            pipeline,
            segments: HashMap::new(),
        })
    }

    /// The processor pipeline implied by a setting and handler: optional
    /// fill/outlier/neutralize steps over the feature columns, then robust
    /// z-score normalization of the label when one exists.
    pub fn default_pipeline(
        setting: &DatasetSetting,
        handler: &dyn DataHandler,
    ) -> ProcessorPipeline {
        let features = handler.feature_names().to_vec();
        let mut pipeline = ProcessorPipeline::new();
        if setting.enable_fillna {
            pipeline.push(Box::new(CSFillna::new(features.clone())));
        }
        if setting.enable_outlier_filter {
            pipeline.push(Box::new(CSFilterOutlier::new(
                features.clone(),
                OutlierMethod::Percentile(setting.outlier_percentile),
            )));
        }
        if setting.enable_neutralize {
            pipeline.push(Box::new(CSNeutralize::new(
                features,
                &setting.industry_col,
                &setting.cap_col,
            )));
        }
        if let Some(label) = handler.label_name() {
            pipeline.push(Box::new(CSZScoreNorm::new(
                vec![label.to_string()],
                setting.clip_outlier,
            )));
        }
        pipeline
    }

    /// Register a named time segment.
    pub fn set_segment(&mut self, segment: Segment, start: NaiveDate, end: NaiveDate) {
        self.segments.insert(segment, (start, end));
    }

    /// Fetch the view for a registered segment.
    pub fn fetch(&self, segment: Segment) -> Result<PanelView<'_>> {
        let (start, end) = self.segments.get(&segment).ok_or_else(|| {
            AlphaError::Configuration(format!("segment {:?} is not registered", segment))
        })?;
        Ok(self.panel.slice(Some(*start), Some(*end)))
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    /// Consume the dataset, keeping only the panel.
    pub fn into_panel(self) -> Panel {
        self.panel
    }

    pub fn pipeline(&self) -> &ProcessorPipeline {
        &self.pipeline
    }

    /// Append a column (e.g. model predictions) to the panel.
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.panel.add_column(name, values)
    }

    /// Persist the fitted processor parameters.
    pub fn save_processor(&self, path: &Path) -> Result<()> {
        self.pipeline.save_params(path)
    }

    /// Write the processed panel as one CSV per symbol.
    pub fn dump(&self, output_dir: &Path) -> Result<()> {
        self.panel.dump(output_dir)
    }

    pub fn len(&self) -> usize {
        self.panel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panel.is_empty()
    }
}
