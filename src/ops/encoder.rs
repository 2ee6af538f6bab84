//! String feature encoders
//!
//! Both encoders fit on the fit table only: the observed categories per
//! feature, in sorted order, become the fitted state. Apply-time behavior for
//! categories never seen during fit is governed by the configured unknown
//! policy and is never a fatal error for the ordinal encoder.

use super::{ensure_known_keys, f64_series, param_f64_lenient, param_str};
use crate::catalog::ParamAssignment;
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Apply-time policy for categories not observed during fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Unknown categories encode as an all-zero indicator row
    Ignore,
    /// Unknown categories fail the transform
    Error,
}

/// Hyperparameters for one-hot encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnehotParams {
    pub handle_unknown: HandleUnknown,
}

impl Default for OnehotParams {
    fn default() -> Self {
        Self {
            handle_unknown: HandleUnknown::Ignore,
        }
    }
}

impl OnehotParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["handle_unknown"])?;
        let mut params = Self::default();
        if let Some(value) = param_str(assignment, "handle_unknown")? {
            params.handle_unknown = match value {
                "ignore" => HandleUnknown::Ignore,
                "error" => HandleUnknown::Error,
                other => {
                    return Err(EnsembleSetError::InvalidParameter {
                        name: "handle_unknown".to_string(),
                        value: other.to_string(),
                        reason: "expected 'ignore' or 'error'".to_string(),
                    })
                }
            };
        }
        Ok(params)
    }
}

/// Hyperparameters for ordinal encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrdinalParams {
    /// Value assigned to categories (and nulls) not observed during fit
    pub unknown_value: f64,
}

impl Default for OrdinalParams {
    fn default() -> Self {
        Self {
            unknown_value: f64::NAN,
        }
    }
}

impl OrdinalParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["unknown_value"])?;
        let mut params = Self::default();
        if let Some(value) = param_f64_lenient(assignment, "unknown_value")? {
            params.unknown_value = value;
        }
        Ok(params)
    }
}

/// One-hot encoder: categorical -> one binary indicator column per observed
/// category, named `{feature}_{category}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    handle_unknown: HandleUnknown,
    // Fitted (feature, sorted categories) pairs, in fit order
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new(handle_unknown: HandleUnknown) -> Self {
        Self {
            handle_unknown,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    /// Record the sorted distinct categories of each feature
    pub fn fit(&mut self, df: &DataFrame, features: &[String]) -> Result<&mut Self> {
        self.categories.clear();
        for feature in features {
            let observed = observed_categories(df, feature)?;
            self.categories.push((feature.clone(), observed));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Replace each fitted feature with its indicator columns
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(EnsembleSetError::NotFitted);
        }

        // Validate before building anything when unknowns are fatal
        if self.handle_unknown == HandleUnknown::Error {
            for (feature, categories) in &self.categories {
                let column = df.column(feature)?;
                let ca = column
                    .as_materialized_series()
                    .str()
                    .map_err(|e| EnsembleSetError::DataError(e.to_string()))?;
                for value in ca.into_iter().flatten() {
                    if categories.binary_search_by(|c| c.as_str().cmp(value)).is_err() {
                        return Err(EnsembleSetError::UnknownCategory {
                            column: feature.clone(),
                            category: value.to_string(),
                        });
                    }
                }
            }
        }

        let mut result = df.clone();
        for (feature, categories) in &self.categories {
            let column = df.column(feature)?;
            let ca = column
                .as_materialized_series()
                .str()
                .map_err(|e| EnsembleSetError::DataError(e.to_string()))?;
            let observed: Vec<Option<String>> = ca
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect();

            for category in categories {
                let name = format!("{}_{}", feature, category);
                let values: Vec<Option<f64>> = observed
                    .iter()
                    .map(|v| match v {
                        Some(s) if s == category => Some(1.0),
                        _ => Some(0.0),
                    })
                    .collect();
                result.with_column(f64_series(&name, values))?;
            }

            result = result.drop(feature)?;
        }

        Ok(result)
    }
}

/// Ordinal encoder: categorical -> rank of the category in sorted fit order,
/// replacing the column in place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    unknown_value: f64,
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl OrdinalEncoder {
    pub fn new(unknown_value: f64) -> Self {
        Self {
            unknown_value,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, df: &DataFrame, features: &[String]) -> Result<&mut Self> {
        self.categories.clear();
        for feature in features {
            let observed = observed_categories(df, feature)?;
            self.categories.push((feature.clone(), observed));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Unseen categories and nulls map to the configured unknown value
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(EnsembleSetError::NotFitted);
        }

        let mut result = df.clone();
        for (feature, categories) in &self.categories {
            let column = df.column(feature)?;
            let ca = column
                .as_materialized_series()
                .str()
                .map_err(|e| EnsembleSetError::DataError(e.to_string()))?;

            let values: Vec<Option<f64>> = ca
                .into_iter()
                .map(|v| {
                    let rank = v.and_then(|s| {
                        categories.binary_search_by(|c| c.as_str().cmp(s)).ok()
                    });
                    Some(match rank {
                        Some(r) => r as f64,
                        None => self.unknown_value,
                    })
                })
                .collect();

            result.with_column(f64_series(feature, values))?;
        }

        Ok(result)
    }
}

/// Sorted distinct non-null values of a string column
fn observed_categories(df: &DataFrame, feature: &str) -> Result<Vec<String>> {
    let column = df
        .column(feature)
        .map_err(|_| EnsembleSetError::FeatureNotFound(feature.to_string()))?;
    let ca = column.as_materialized_series().str().map_err(|_| {
        EnsembleSetError::DataError(format!("column '{}' is not a string column", feature))
    })?;

    let distinct: BTreeSet<String> = ca
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();
    Ok(distinct.into_iter().collect())
}

/// One-hot encode `features`, fitting on `fit` and applying the fitted
/// categories to `apply`
pub(crate) fn onehot_encoding(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &OnehotParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut encoder = OneHotEncoder::new(params.handle_unknown);
    encoder.fit(&fit, features)?;
    let fit_out = encoder.transform(&fit)?;
    let apply_out = match apply {
        Some(df) => Some(encoder.transform(&df)?),
        None => None,
    };
    Ok((fit_out, apply_out))
}

/// Ordinal encode `features`, fitting on `fit` and applying the fitted
/// ranks to `apply`
pub(crate) fn ordinal_encoding(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &OrdinalParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut encoder = OrdinalEncoder::new(params.unknown_value);
    encoder.fit(&fit, features)?;
    let fit_out = encoder.transform(&fit)?;
    let apply_out = match apply {
        Some(df) => Some(encoder.transform(&df)?),
        None => None,
    };
    Ok((fit_out, apply_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_df(values: &[&str]) -> DataFrame {
        DataFrame::new(vec![Series::new("feature3".into(), values).into()]).unwrap()
    }

    #[test]
    fn test_onehot_column_per_category() {
        let df = string_df(&["a", "b", "c", "a"]);
        let features = vec!["feature3".to_string()];
        let (fit, _) =
            onehot_encoding(df, None, &features, &OnehotParams::default()).unwrap();

        // One column per distinct observed category, original dropped
        assert!(fit.column("feature3").is_err());
        assert_eq!(fit.width(), 3);
        let a: Vec<f64> = fit
            .column("feature3_a")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(a, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_onehot_unknown_ignored() {
        let fit = string_df(&["a", "b", "a", "b"]);
        let apply = string_df(&["a", "z", "b", "z"]);
        let features = vec!["feature3".to_string()];
        let (_, apply_out) =
            onehot_encoding(fit, Some(apply), &features, &OnehotParams::default()).unwrap();
        let apply_out = apply_out.unwrap();

        // Unknown "z" rows are all zeros across the indicator columns
        let a: Vec<f64> = apply_out
            .column("feature3_a")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        let b: Vec<f64> = apply_out
            .column("feature3_b")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(a[1] + b[1], 0.0);
        assert_eq!(a[3] + b[3], 0.0);
    }

    #[test]
    fn test_onehot_unknown_error_policy() {
        let fit = string_df(&["a", "b", "a", "b"]);
        let apply = string_df(&["a", "z", "b", "b"]);
        let features = vec!["feature3".to_string()];
        let params = OnehotParams {
            handle_unknown: HandleUnknown::Error,
        };
        let result = onehot_encoding(fit, Some(apply), &features, &params);
        assert!(matches!(
            result,
            Err(EnsembleSetError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn test_ordinal_ranks_sorted_categories() {
        let df = string_df(&["c", "a", "b", "a"]);
        let features = vec!["feature3".to_string()];
        let (fit, _) =
            ordinal_encoding(df, None, &features, &OrdinalParams::default()).unwrap();

        let ranks: Vec<f64> = fit
            .column("feature3")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ranks, vec![2.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_ordinal_unseen_maps_to_sentinel() {
        let fit = string_df(&["a", "b", "c", "c"]);
        let apply = string_df(&["a", "z", "b", "c"]);
        let features = vec!["feature3".to_string()];
        let (_, apply_out) =
            ordinal_encoding(fit, Some(apply), &features, &OrdinalParams::default()).unwrap();
        let apply_out = apply_out.unwrap();

        let encoded: Vec<f64> = apply_out
            .column("feature3")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(encoded[0], 0.0);
        assert!(encoded[1].is_nan());
        assert_eq!(encoded[2], 1.0);
        assert_eq!(encoded[3], 2.0);
    }
}
