//! Error types for the dataset pipeline.

use thiserror::Error;

/// Errors surfaced by dataset assembly and processing.
///
/// Unavailable data (a symbol without a source file, or with insufficient
/// history) is not an error: loaders return `Ok(None)` and callers skip the
/// symbol. Only zero surviving symbols escalates to [`AlphaError::EmptyDataset`].
#[derive(Debug, Error)]
pub enum AlphaError {
    /// Missing universe file, unparseable date, or invalid time range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No symbol survived loading and filtering.
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// Duplicate (date, symbol) composite keys after assembly.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A referenced column is absent, or persisted processor parameters
    /// disagree with the requested column set.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AlphaError>;
