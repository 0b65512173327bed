//! Feature handlers: per-symbol indicator and label computation.

use crate::dataset::frame::SeriesFrame;
use crate::dataset::indicator;
use crate::error::{AlphaError, Result};

/// Lookback windows shared by the momentum, high/low ratio and volume
/// volatility families.
const WINDOWS: [usize; 5] = [1, 3, 5, 15, 30];

/// Capability interface for feature engines.
///
/// A handler maps one symbol's raw series to the same series extended with
/// its indicator columns and, for training panels, a label column. The
/// declared feature order is stable: downstream feature-importance
/// reporting depends on it.
pub trait DataHandler: Send + Sync {
    /// Extend a raw frame with computed feature columns.
    fn fetch(&self, frame: SeriesFrame) -> Result<SeriesFrame>;

    /// Feature column names, in declaration order.
    fn feature_names(&self) -> &[String];

    /// Label column name, if this handler produces one.
    fn label_name(&self) -> Option<&str>;
}

/// Technical-indicator handler: momentum, high/low ratio, volume
/// volatility, OBV, RSI(14), MACD(12,26,9) and KDJ(9,3,3), plus a
/// two-day-forward return label in training mode.
pub struct Alpha100 {
    test_mode: bool,
    feature_names: Vec<String>,
}

impl Alpha100 {
    pub fn new(test_mode: bool) -> Self {
        let mut feature_names = Vec::new();
        for prefix in ["momentum", "highlow", "vstd"] {
            for n in WINDOWS {
                feature_names.push(format!("{}_{}d", prefix, n));
            }
        }
        for name in ["sobv", "rsi", "dif", "dea", "macd", "kdj_k", "kdj_d", "kdj_j"] {
            feature_names.push(name.to_string());
        }
        Self {
            test_mode,
            feature_names,
        }
    }

    fn require<'a>(frame: &'a SeriesFrame, name: &str) -> Result<&'a [f64]> {
        frame.column(name).ok_or_else(|| {
            AlphaError::SchemaMismatch(format!(
                "frame '{}' is missing required column '{}'",
                frame.symbol(),
                name
            ))
        })
    }
}

impl DataHandler for Alpha100 {
    fn fetch(&self, frame: SeriesFrame) -> Result<SeriesFrame> {
        let close = Self::require(&frame, "Close")?.to_vec();
        let high = Self::require(&frame, "High")?.to_vec();
        let low = Self::require(&frame, "Low")?.to_vec();
        let volume = Self::require(&frame, "Volume")?.to_vec();

        let mut frame = frame;
        for n in WINDOWS {
            frame.add_column(&format!("momentum_{}d", n), indicator::mom(&close, n))?;
        }
        for n in WINDOWS {
            frame.add_column(&format!("highlow_{}d", n), indicator::highlow(&close, n))?;
        }
        for n in WINDOWS {
            frame.add_column(&format!("vstd_{}d", n), indicator::rolling_std(&volume, n))?;
        }

        frame.add_column("sobv", indicator::obv(&close, &volume))?;
        frame.add_column("rsi", indicator::rsi(&close, 14))?;

        let (dif, dea, hist) = indicator::macd(&close, 12, 26, 9);
        frame.add_column("dif", dif)?;
        frame.add_column("dea", dea)?;
        frame.add_column("macd", hist)?;

        let (kdj_k, kdj_d, kdj_j) = indicator::stoch_kdj(&high, &low, &close, 9, 3, 3);
        frame.add_column("kdj_k", kdj_k)?;
        frame.add_column("kdj_d", kdj_d)?;
        frame.add_column("kdj_j", kdj_j)?;

        if !self.test_mode {
            let label = indicator::forward_return(&close);
            frame.add_column("label_reg", label)?;
            // rows without a defined label never reach the panel
            let keep: Vec<bool> = frame
                .column("label_reg")
                .unwrap()
                .iter()
                .map(|v| !v.is_nan())
                .collect();
            frame.retain_rows(&keep);
        }

        Ok(frame)
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn label_name(&self) -> Option<&str> {
        if self.test_mode {
            None
        } else {
            Some("label_reg")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_frame(symbol: &str, close: &[f64]) -> SeriesFrame {
        let dates: Vec<NaiveDate> = (0..close.len())
            .map(|i| {
                NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Days::new(i as u64)
            })
            .collect();
        let mut frame = SeriesFrame::new(symbol, dates);
        frame
            .add_column("Open", close.iter().map(|c| c - 0.5).collect())
            .unwrap();
        frame
            .add_column("High", close.iter().map(|c| c + 1.0).collect())
            .unwrap();
        frame
            .add_column("Low", close.iter().map(|c| c - 1.0).collect())
            .unwrap();
        frame.add_column("Close", close.to_vec()).unwrap();
        frame
            .add_column("Volume", close.iter().map(|c| c * 10.0).collect())
            .unwrap();
        frame
            .add_column("Adj_factor", vec![1.0; close.len()])
            .unwrap();
        frame
    }

    #[test]
    fn test_label_drops_last_two_rows() {
        let handler = Alpha100::new(false);
        let frame = make_frame("AAA", &[10.0, 11.0, 12.0, 9.0]);
        let out = handler.fetch(frame).unwrap();
        assert_eq!(out.len(), 2);
        let label = out.column("label_reg").unwrap();
        assert!((label[0] - (12.0 / 11.0 - 1.0)).abs() < 1e-12);
        assert!((label[1] - (9.0 / 12.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_test_mode_keeps_all_rows() {
        let handler = Alpha100::new(true);
        let frame = make_frame("AAA", &[10.0, 11.0, 12.0, 9.0]);
        let out = handler.fetch(frame).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.column("label_reg").is_none());
        assert!(handler.label_name().is_none());
    }

    #[test]
    fn test_feature_columns_present_in_declared_order() {
        let handler = Alpha100::new(true);
        let frame = make_frame("AAA", &[10.0; 40]);
        let out = handler.fetch(frame).unwrap();
        for name in handler.feature_names() {
            assert!(out.column(name).is_some(), "missing feature {}", name);
        }
        assert_eq!(handler.feature_names()[0], "momentum_1d");
        assert_eq!(handler.feature_names().last().unwrap(), "kdj_j");
        assert_eq!(handler.feature_names().len(), 23);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let handler = Alpha100::new(true);
        let dates = vec![NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()];
        let frame = SeriesFrame::new("AAA", dates);
        assert!(matches!(
            handler.fetch(frame),
            Err(AlphaError::SchemaMismatch(_))
        ));
    }
}
