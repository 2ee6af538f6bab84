//! Min-max scaling
//!
//! Used standalone and internally by the log operation to move non-positive
//! columns into a strictly positive range before taking logarithms.

use super::f64_series;
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters fitted for one column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    min: f64,
    range: f64,
}

/// Min-max scaler mapping each fitted column into `feature_range`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    feature_range: (f64, f64),
    params: HashMap<String, ScalerParams>,
    is_fitted: bool,
}

impl MinMaxScaler {
    /// Create a scaler targeting the default [0, 1] range
    pub fn new() -> Self {
        Self::with_feature_range(0.0, 1.0)
    }

    /// Create a scaler targeting `[low, high]`
    pub fn with_feature_range(low: f64, high: f64) -> Self {
        Self {
            feature_range: (low, high),
            params: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Fit the per-column minimum and range on finite values only
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        for col_name in columns {
            let values = super::to_f64_values(df, col_name)?;
            let finite: Vec<f64> = values
                .iter()
                .flatten()
                .copied()
                .filter(|v| v.is_finite())
                .collect();

            let (min, max) = finite.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            );
            let (min, range) = if finite.is_empty() {
                (0.0, 1.0)
            } else {
                let range = max - min;
                (min, if range == 0.0 { 1.0 } else { range })
            };

            self.params
                .insert(col_name.clone(), ScalerParams { min, range });
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Scale every fitted column present in `df`
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(EnsembleSetError::NotFitted);
        }

        let (low, high) = self.feature_range;
        let span = high - low;

        let mut result = df.clone();
        for (col_name, params) in &self.params {
            if df.column(col_name).is_err() {
                continue;
            }
            let values = super::to_f64_values(df, col_name)?;
            let scaled: Vec<Option<f64>> = values
                .into_iter()
                .map(|opt| opt.map(|v| low + (v - params.min) / params.range * span))
                .collect();
            result.with_column(f64_series(col_name, scaled))?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_range() {
        let df = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let mut scaler = MinMaxScaler::new();
        let result = scaler
            .fit_transform(&df, &["a".to_string()])
            .unwrap();

        let col = result.column("a").unwrap().f64().unwrap();
        assert!((col.min().unwrap() - 0.0).abs() < 1e-12);
        assert!((col.max().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strictly_positive_range() {
        let df = df!("a" => &[-1.0, 0.0, 1.0, 2.0]).unwrap();
        let mut scaler = MinMaxScaler::with_feature_range(1.0, 2.0);
        let result = scaler
            .fit_transform(&df, &["a".to_string()])
            .unwrap();

        let values: Vec<f64> = result
            .column("a")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(values.iter().all(|&v| v >= 1.0 && v <= 2.0));
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[3] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_apply_uses_fitted_bounds() {
        let fit = df!("a" => &[0.0, 10.0]).unwrap();
        let apply = df!("a" => &[20.0]).unwrap();

        let mut scaler = MinMaxScaler::new();
        scaler.fit(&fit, &["a".to_string()]).unwrap();
        let scaled = scaler.transform(&apply).unwrap();

        // Out-of-range apply values extrapolate past the target range
        let value = scaled.column("a").unwrap().f64().unwrap().get(0).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column() {
        let df = df!("a" => &[5.0, 5.0, 5.0]).unwrap();
        let mut scaler = MinMaxScaler::new();
        let result = scaler
            .fit_transform(&df, &["a".to_string()])
            .unwrap();
        let values: Vec<f64> = result
            .column("a")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(values.iter().all(|&v| v == 0.0));
    }
}
