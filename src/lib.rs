//! alpha_lab - panel dataset assembly for alpha research
//!
//! This crate turns heterogeneous per-symbol price series into a single
//! feature matrix ready for model training and evaluation:
//!
//! - Symbol universe and per-symbol series loading
//! - Technical-indicator feature computation with lookback windows
//! - Panel assembly keyed by (date, symbol)
//! - Forward-label construction with correct time alignment
//! - Cross-sectional fit/transform processors with persisted state
//! - Time-range views for train/validation/test segmentation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use alpha_lab::{Alpha100, Dataset, DatasetSetting};
//!
//! fn main() -> alpha_lab::Result<()> {
//!     alpha_lab::logger::init_logger();
//!
//!     let mut setting = DatasetSetting::default();
//!     setting.data_dir = "./data".into();
//!     setting.instruments = "all".to_string();
//!
//!     let handler = Alpha100::new(false);
//!     let dataset = Dataset::build(&setting, &handler)?;
//!     dataset.dump(std::path::Path::new("./output"))?;
//!     Ok(())
//! }
//! ```

pub mod dataset;
pub mod error;
pub mod logger;
pub mod model;
pub mod setting;

// Re-export commonly used types
pub use dataset::{
    Alpha100, CSFillna, CSFilterOutlier, CSNeutralize, CSZScoreNorm, Column, DataHandler, Dataset,
    OutlierMethod, Panel, PanelView, Processor, ProcessorParams, ProcessorPipeline, Segment,
    SeriesFrame,
};
pub use error::{AlphaError, Result};
pub use model::AlphaModel;
pub use setting::DatasetSetting;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
