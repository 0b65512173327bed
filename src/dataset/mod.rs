//! Dataset module: loaders, feature handlers, panel assembly and
//! cross-sectional processing.

pub mod frame;
pub mod handler;
pub mod indicator;
pub mod loader;
pub mod panel;
pub mod processor;
pub mod template;
pub mod utility;

pub use frame::{Column, SeriesFrame};
pub use handler::{Alpha100, DataHandler};
pub use loader::{load_features, load_symbols, load_universe, resolve_symbols};
pub use panel::{Panel, PanelView};
pub use processor::{
    CSFillna, CSFilterOutlier, CSNeutralize, CSZScoreNorm, OutlierMethod, Processor,
    ProcessorParams, ProcessorPipeline,
};
pub use template::Dataset;
pub use utility::{to_date, Segment};
