//! Utility functions and data structures for datasets.

use chrono::NaiveDate;

use crate::error::{AlphaError, Result};

/// Data segment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Train,
    Valid,
    Test,
}

/// Parse a trading-day date from `YYYY-MM-DD` or `YYYYMMDD`.
pub fn to_date(arg: &str) -> Result<NaiveDate> {
    let format = if arg.contains('-') { "%Y-%m-%d" } else { "%Y%m%d" };
    NaiveDate::parse_from_str(arg, format)
        .map_err(|e| AlphaError::Configuration(format!("invalid date '{}': {}", arg, e)))
}

/// Parse an optional time bound, `None` meaning unbounded.
pub fn to_date_opt(arg: Option<&str>) -> Result<Option<NaiveDate>> {
    match arg {
        Some(s) => Ok(Some(to_date(s)?)),
        None => Ok(None),
    }
}
