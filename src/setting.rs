//! Dataset build settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings driving dataset assembly and processing.
///
/// Loadable from a JSON file; absent fields fall back to the defaults
/// below. The fill/outlier/neutralize switches expose the optional
/// cross-sectional steps explicitly instead of hard-wiring them off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSetting {
    /// Root directory holding `instruments/` and `features/`.
    pub data_dir: PathBuf,
    /// Comma-separated universe names.
    pub instruments: String,
    /// Inclusive time range bounds, `YYYY-MM-DD`; `None` means unbounded.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Minimum trade rows a symbol needs to enter the panel.
    pub min_periods: usize,
    /// Minimum listing age for tabular universes.
    pub min_listing_days: i64,
    /// Uniform random permutation of the assembled panel.
    pub shuffle: bool,
    pub enable_fillna: bool,
    pub enable_outlier_filter: bool,
    pub enable_neutralize: bool,
    /// Quantile for the outlier filter's `[p, 1-p]` bounds.
    pub outlier_percentile: f64,
    /// Clip z-scores to [-3, 3].
    pub clip_outlier: bool,
    /// Auxiliary columns consumed by neutralization.
    pub industry_col: String,
    pub cap_col: String,
}

impl Default for DatasetSetting {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            instruments: "all".to_string(),
            start_time: None,
            end_time: None,
            min_periods: 30,
            min_listing_days: 365,
            shuffle: false,
            enable_fillna: false,
            enable_outlier_filter: false,
            enable_neutralize: false,
            outlier_percentile: 0.01,
            clip_outlier: true,
            industry_col: "Industry_id".to_string(),
            cap_col: "Total_mv".to_string(),
        }
    }
}

impl DatasetSetting {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Save settings as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
