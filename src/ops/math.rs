//! Elementwise and combination operations
//!
//! Log and exponential transform target columns in place. Ratio, sum, and
//! difference append combination columns and keep the originals. The log
//! operation rescales any column with non-positive fitted values into a
//! strictly positive range first, using bounds learned from the fit table
//! only.

use super::{
    ensure_known_keys, f64_series, param_f64_lenient, param_str, param_usize, to_f64_values,
    MinMaxScaler,
};
use crate::catalog::ParamAssignment;
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Logarithm base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogBase {
    Two,
    E,
    Ten,
}

impl LogBase {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "2" => Ok(Self::Two),
            "e" => Ok(Self::E),
            "10" => Ok(Self::Ten),
            other => Err(EnsembleSetError::InvalidParameter {
                name: "base".to_string(),
                value: other.to_string(),
                reason: "expected '2', 'e', or '10'".to_string(),
            }),
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Two => v.log2(),
            Self::E => v.ln(),
            Self::Ten => v.log10(),
        }
    }
}

/// Hyperparameters for the log transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogParams {
    pub base: LogBase,
}

impl Default for LogParams {
    fn default() -> Self {
        Self { base: LogBase::E }
    }
}

impl LogParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["base"])?;
        let mut params = Self::default();
        if let Some(s) = param_str(assignment, "base")? {
            params.base = LogBase::parse(s)?;
        }
        Ok(params)
    }
}

/// Exponentiation base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpBase {
    Two,
    E,
}

impl ExpBase {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "2" => Ok(Self::Two),
            "e" => Ok(Self::E),
            other => Err(EnsembleSetError::InvalidParameter {
                name: "base".to_string(),
                value: other.to_string(),
                reason: "expected '2' or 'e'".to_string(),
            }),
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Two => v.exp2(),
            Self::E => v.exp(),
        }
    }
}

/// Hyperparameters for the exponential transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialParams {
    pub base: ExpBase,
}

impl Default for ExponentialParams {
    fn default() -> Self {
        Self { base: ExpBase::E }
    }
}

impl ExponentialParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["base"])?;
        let mut params = Self::default();
        if let Some(s) = param_str(assignment, "base")? {
            params.base = ExpBase::parse(s)?;
        }
        Ok(params)
    }
}

/// Hyperparameters for pairwise ratios
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioParams {
    /// Value substituted when the denominator is exactly zero
    pub div_zero_value: f64,
}

impl Default for RatioParams {
    fn default() -> Self {
        Self {
            div_zero_value: f64::NAN,
        }
    }
}

impl RatioParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["div_zero_value"])?;
        let mut params = Self::default();
        if let Some(v) = param_f64_lenient(assignment, "div_zero_value")? {
            params.div_zero_value = v;
        }
        Ok(params)
    }
}

/// Hyperparameters for windowed sums
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SumParams {
    pub n_addends: usize,
}

impl Default for SumParams {
    fn default() -> Self {
        Self { n_addends: 2 }
    }
}

impl SumParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["n_addends"])?;
        let mut params = Self::default();
        if let Some(n) = param_usize(assignment, "n_addends")? {
            if n < 2 {
                return Err(EnsembleSetError::InvalidParameter {
                    name: "n_addends".to_string(),
                    value: n.to_string(),
                    reason: "must be at least 2".to_string(),
                });
            }
            params.n_addends = n;
        }
        Ok(params)
    }
}

/// Hyperparameters for windowed differences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferenceParams {
    pub n_subtrahends: usize,
}

impl Default for DifferenceParams {
    fn default() -> Self {
        Self { n_subtrahends: 2 }
    }
}

impl DifferenceParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["n_subtrahends"])?;
        let mut params = Self::default();
        if let Some(n) = param_usize(assignment, "n_subtrahends")? {
            if n < 2 {
                return Err(EnsembleSetError::InvalidParameter {
                    name: "n_subtrahends".to_string(),
                    value: n.to_string(),
                    reason: "must be at least 2".to_string(),
                });
            }
            params.n_subtrahends = n;
        }
        Ok(params)
    }
}

/// Log-transform `features` in place. Columns whose fitted minimum is not
/// strictly positive are first rescaled into [1, 2] with bounds learned from
/// the fit table, so the transform is defined everywhere and the apply table
/// reuses the same bounds.
pub(crate) fn log_features(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &LogParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut rescale: Vec<String> = Vec::new();
    for feature in features {
        let min = to_f64_values(&fit, feature)?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, f64::min);
        if min <= 0.0 {
            rescale.push(feature.clone());
        }
    }

    let (mut fit, mut apply) = if rescale.is_empty() {
        (fit, apply)
    } else {
        let mut scaler = MinMaxScaler::with_feature_range(1.0, 2.0);
        scaler.fit(&fit, &rescale)?;
        let fit = scaler.transform(&fit)?;
        let apply = match apply {
            Some(df) => Some(scaler.transform(&df)?),
            None => None,
        };
        (fit, apply)
    };

    for feature in features {
        elementwise_in_place(&mut fit, feature, |v| params.base.apply(v))?;
        if let Some(df) = apply.as_mut() {
            elementwise_in_place(df, feature, |v| params.base.apply(v))?;
        }
    }
    Ok((fit, apply))
}

/// Exponentiate `features` in place on both tables
pub(crate) fn exponential_features(
    mut fit: DataFrame,
    mut apply: Option<DataFrame>,
    features: &[String],
    params: &ExponentialParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    for feature in features {
        elementwise_in_place(&mut fit, feature, |v| params.base.apply(v))?;
        if let Some(df) = apply.as_mut() {
            elementwise_in_place(df, feature, |v| params.base.apply(v))?;
        }
    }
    Ok((fit, apply))
}

/// Append one ratio column `{a}_over_{b}` per ordered pair of distinct
/// features; zero denominators yield the configured substitute value. The
/// original columns are kept.
pub(crate) fn ratio_features(
    mut fit: DataFrame,
    mut apply: Option<DataFrame>,
    features: &[String],
    params: &RatioParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    for numerator in features {
        for denominator in features {
            if numerator == denominator {
                continue;
            }
            let name = format!("{}_over_{}", numerator, denominator);
            append_ratio(&mut fit, numerator, denominator, &name, params.div_zero_value)?;
            if let Some(df) = apply.as_mut() {
                append_ratio(df, numerator, denominator, &name, params.div_zero_value)?;
            }
        }
    }
    Ok((fit, apply))
}

/// Append windowed sums `sum_{f1}_{f2}[...]` over each run of `n_addends`
/// consecutive features; the originals are kept.
pub(crate) fn sum_features(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &SumParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    windowed_combination(fit, apply, features, params.n_addends, "sum", |acc, v| acc + v)
}

/// Append windowed differences `diff_{f1}_{f2}[...]`, subtracting left to
/// right across each run of `n_subtrahends` consecutive features; the
/// originals are kept.
pub(crate) fn difference_features(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &DifferenceParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    windowed_combination(
        fit,
        apply,
        features,
        params.n_subtrahends,
        "diff",
        |acc, v| acc - v,
    )
}

fn windowed_combination(
    mut fit: DataFrame,
    mut apply: Option<DataFrame>,
    features: &[String],
    width: usize,
    prefix: &str,
    fold: impl Fn(f64, f64) -> f64 + Copy,
) -> Result<(DataFrame, Option<DataFrame>)> {
    if width > features.len() {
        return Err(EnsembleSetError::InsufficientFeatures {
            requested: width,
            available: features.len(),
        });
    }

    for window in features.windows(width) {
        let name = format!("{}_{}", prefix, window.join("_"));
        append_fold(&mut fit, window, &name, fold)?;
        if let Some(df) = apply.as_mut() {
            append_fold(df, window, &name, fold)?;
        }
    }
    Ok((fit, apply))
}

fn append_fold(
    df: &mut DataFrame,
    window: &[String],
    name: &str,
    fold: impl Fn(f64, f64) -> f64,
) -> Result<()> {
    let columns: Vec<Vec<Option<f64>>> = window
        .iter()
        .map(|feature| to_f64_values(df, feature))
        .collect::<Result<_>>()?;

    let height = df.height();
    let values: Vec<Option<f64>> = (0..height)
        .map(|row| {
            let mut acc = match columns[0][row] {
                Some(v) => v,
                None => return None,
            };
            for col in &columns[1..] {
                match col[row] {
                    Some(v) => acc = fold(acc, v),
                    None => return None,
                }
            }
            Some(acc)
        })
        .collect();

    df.with_column(f64_series(name, values))?;
    Ok(())
}

fn append_ratio(
    df: &mut DataFrame,
    numerator: &str,
    denominator: &str,
    name: &str,
    div_zero_value: f64,
) -> Result<()> {
    let num = to_f64_values(df, numerator)?;
    let den = to_f64_values(df, denominator)?;
    let values: Vec<Option<f64>> = num
        .into_iter()
        .zip(den)
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) => {
                if d == 0.0 {
                    Some(div_zero_value)
                } else {
                    Some(n / d)
                }
            }
            _ => None,
        })
        .collect();
    df.with_column(f64_series(name, values))?;
    Ok(())
}

fn elementwise_in_place(
    df: &mut DataFrame,
    feature: &str,
    f: impl Fn(f64) -> f64,
) -> Result<()> {
    let values: Vec<Option<f64>> = to_f64_values(df, feature)?
        .into_iter()
        .map(|opt| opt.map(&f))
        .collect();
    df.with_column(f64_series(feature, values))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_log_rescues_non_positive_column() {
        let df = df!("a" => &[-1.0, 0.0, 1.0, 2.0]).unwrap();
        let features = vec!["a".to_string()];
        let (fit, _) = log_features(df, None, &features, &LogParams::default()).unwrap();

        let values = col(&fit, "a");
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| v.is_finite()));
        // Rescaled into [1, 2], so logs land in [0, ln 2]
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[3] - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_leaves_positive_column_unscaled() {
        let df = df!("a" => &[1.0, 4.0, 16.0]).unwrap();
        let features = vec!["a".to_string()];
        let params = LogParams { base: LogBase::Two };
        let (fit, _) = log_features(df, None, &features, &params).unwrap();
        assert_eq!(col(&fit, "a"), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_log_apply_reuses_fit_bounds() {
        let fit = df!("a" => &[0.0, 10.0]).unwrap();
        let apply = df!("a" => &[10.0]).unwrap();
        let features = vec!["a".to_string()];
        let (fit_out, apply_out) =
            log_features(fit, Some(apply), &features, &LogParams::default()).unwrap();

        let fit_vals = col(&fit_out, "a");
        let apply_vals = col(&apply_out.unwrap(), "a");
        assert!((apply_vals[0] - fit_vals[1]).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_base_two() {
        let df = df!("a" => &[0.0, 1.0, 3.0]).unwrap();
        let features = vec!["a".to_string()];
        let params = ExponentialParams { base: ExpBase::Two };
        let (fit, _) = exponential_features(df, None, &features, &params).unwrap();
        assert_eq!(col(&fit, "a"), vec![1.0, 2.0, 8.0]);
    }

    #[test]
    fn test_ratio_pairs_and_div_zero() {
        let df = df!("a" => &[1.0, 2.0], "b" => &[0.0, 4.0]).unwrap();
        let features = vec!["a".to_string(), "b".to_string()];
        let (fit, _) = ratio_features(df, None, &features, &RatioParams::default()).unwrap();

        // Originals kept, both ordered pairs appended
        assert!(fit.column("a").is_ok());
        assert!(fit.column("b").is_ok());
        let a_over_b = fit.column("a_over_b").unwrap().f64().unwrap();
        assert!(a_over_b.get(0).unwrap().is_nan());
        assert!((a_over_b.get(1).unwrap() - 0.5).abs() < 1e-12);
        let b_over_a = col(&fit, "b_over_a");
        assert_eq!(b_over_a, vec![0.0, 2.0]);
    }

    #[test]
    fn test_ratio_custom_div_zero_value() {
        let df = df!("a" => &[1.0], "b" => &[0.0]).unwrap();
        let features = vec!["a".to_string(), "b".to_string()];
        let params = RatioParams { div_zero_value: 0.0 };
        let (fit, _) = ratio_features(df, None, &features, &params).unwrap();
        assert_eq!(col(&fit, "a_over_b"), vec![0.0]);
    }

    #[test]
    fn test_sum_window_count_and_values() {
        let df = df!("a" => &[1.0], "b" => &[2.0], "c" => &[3.0]).unwrap();
        let features = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (fit, _) = sum_features(df, None, &features, &SumParams::default()).unwrap();

        assert_eq!(col(&fit, "sum_a_b"), vec![3.0]);
        assert_eq!(col(&fit, "sum_b_c"), vec![5.0]);
        assert!(fit.column("sum_a_c").is_err());
    }

    #[test]
    fn test_difference_subtracts_left_to_right() {
        let df = df!("a" => &[10.0], "b" => &[3.0], "c" => &[2.0]).unwrap();
        let features = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let params = DifferenceParams { n_subtrahends: 3 };
        let (fit, _) = difference_features(df, None, &features, &params).unwrap();
        assert_eq!(col(&fit, "diff_a_b_c"), vec![5.0]);
    }

    #[test]
    fn test_window_wider_than_features_fails() {
        let df = df!("a" => &[1.0], "b" => &[2.0]).unwrap();
        let features = vec!["a".to_string(), "b".to_string()];
        let params = SumParams { n_addends: 3 };
        let result = sum_features(df, None, &features, &params);
        assert!(matches!(
            result,
            Err(EnsembleSetError::InsufficientFeatures {
                requested: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_null_propagates_through_sum() {
        let df = df!("a" => &[Some(1.0), None], "b" => &[Some(2.0), Some(3.0)]).unwrap();
        let features = vec!["a".to_string(), "b".to_string()];
        let (fit, _) = sum_features(df, None, &features, &SumParams::default()).unwrap();
        let sums = fit.column("sum_a_b").unwrap().f64().unwrap();
        assert_eq!(sums.get(0), Some(3.0));
        assert!(sums.get(1).is_none());
    }
}
