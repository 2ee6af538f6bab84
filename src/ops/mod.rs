//! Feature engineering operation library
//!
//! Every operation is a pure function over a `(fit, apply)` DataFrame pair:
//! parameters are fitted on the fit table only and applied, unmodified, to
//! the apply table when one is present. Operations never mutate their inputs
//! in place from the caller's point of view; they consume owned frames and
//! return new ones.
//!
//! Column conventions shared across operations:
//! - encoders, polynomial, and spline expansion drop the target columns and
//!   append newly named ones
//! - log and exponential transform values in place, keeping column names
//! - ratio, sum, and difference append combination columns and keep the
//!   originals

mod encoder;
mod scaler;
mod polynomial;
mod spline;
mod math;

pub use encoder::{HandleUnknown, OneHotEncoder, OnehotParams, OrdinalEncoder, OrdinalParams};
pub use scaler::MinMaxScaler;
pub use polynomial::{PolyParams, PolynomialBasis};
pub use spline::{Extrapolation, KnotStrategy, SplineExpansion, SplineParams};
pub use math::{
    DifferenceParams, ExpBase, ExponentialParams, LogBase, LogParams, RatioParams, SumParams,
};

use crate::catalog::{Operation, ParamAssignment};
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;

/// Typed, validated hyperparameters for one operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationParams {
    Onehot(OnehotParams),
    Ordinal(OrdinalParams),
    Poly(PolyParams),
    Spline(SplineParams),
    Log(LogParams),
    Ratio(RatioParams),
    Exponential(ExponentialParams),
    Sum(SumParams),
    Difference(DifferenceParams),
}

impl OperationParams {
    /// Build the typed parameter set for an operation from a sampled
    /// assignment, validating keys and value types. Missing keys fall back
    /// to operation defaults.
    pub fn from_assignment(operation: Operation, assignment: &ParamAssignment) -> Result<Self> {
        match operation {
            Operation::OnehotEncoding => {
                Ok(OperationParams::Onehot(OnehotParams::from_assignment(assignment)?))
            }
            Operation::OrdinalEncoding => {
                Ok(OperationParams::Ordinal(OrdinalParams::from_assignment(assignment)?))
            }
            Operation::PolyFeatures => {
                Ok(OperationParams::Poly(PolyParams::from_assignment(assignment)?))
            }
            Operation::SplineFeatures => {
                Ok(OperationParams::Spline(SplineParams::from_assignment(assignment)?))
            }
            Operation::LogFeatures => {
                Ok(OperationParams::Log(LogParams::from_assignment(assignment)?))
            }
            Operation::RatioFeatures => {
                Ok(OperationParams::Ratio(RatioParams::from_assignment(assignment)?))
            }
            Operation::ExponentialFeatures => Ok(OperationParams::Exponential(
                ExponentialParams::from_assignment(assignment)?,
            )),
            Operation::SumFeatures => {
                Ok(OperationParams::Sum(SumParams::from_assignment(assignment)?))
            }
            Operation::DifferenceFeatures => Ok(OperationParams::Difference(
                DifferenceParams::from_assignment(assignment)?,
            )),
        }
    }
}

/// Dispatch one operation over a `(fit, apply)` pair.
///
/// Validates the shared target-feature contract first: `target_features`
/// must be non-empty and present in both tables.
pub fn apply_operation(
    operation: Operation,
    params: &OperationParams,
    fit: DataFrame,
    apply: Option<DataFrame>,
    target_features: &[String],
) -> Result<(DataFrame, Option<DataFrame>)> {
    validate_targets(&fit, apply.as_ref(), target_features)?;

    match (operation, params) {
        (Operation::OnehotEncoding, OperationParams::Onehot(p)) => {
            encoder::onehot_encoding(fit, apply, target_features, p)
        }
        (Operation::OrdinalEncoding, OperationParams::Ordinal(p)) => {
            encoder::ordinal_encoding(fit, apply, target_features, p)
        }
        (Operation::PolyFeatures, OperationParams::Poly(p)) => {
            polynomial::poly_features(fit, apply, target_features, p)
        }
        (Operation::SplineFeatures, OperationParams::Spline(p)) => {
            spline::spline_features(fit, apply, target_features, p)
        }
        (Operation::LogFeatures, OperationParams::Log(p)) => {
            math::log_features(fit, apply, target_features, p)
        }
        (Operation::RatioFeatures, OperationParams::Ratio(p)) => {
            math::ratio_features(fit, apply, target_features, p)
        }
        (Operation::ExponentialFeatures, OperationParams::Exponential(p)) => {
            math::exponential_features(fit, apply, target_features, p)
        }
        (Operation::SumFeatures, OperationParams::Sum(p)) => {
            math::sum_features(fit, apply, target_features, p)
        }
        (Operation::DifferenceFeatures, OperationParams::Difference(p)) => {
            math::difference_features(fit, apply, target_features, p)
        }
        (operation, _) => Err(EnsembleSetError::InvalidArgument(format!(
            "parameter set does not match operation '{}'",
            operation
        ))),
    }
}

/// Shared precondition: targets are non-empty and present in both tables
pub(crate) fn validate_targets(
    fit: &DataFrame,
    apply: Option<&DataFrame>,
    target_features: &[String],
) -> Result<()> {
    if target_features.is_empty() {
        return Err(EnsembleSetError::EmptyTargetFeatures);
    }
    for feature in target_features {
        if fit.column(feature).is_err() {
            return Err(EnsembleSetError::FeatureNotFound(feature.clone()));
        }
        if let Some(apply) = apply {
            if apply.column(feature).is_err() {
                return Err(EnsembleSetError::FeatureNotFound(feature.clone()));
            }
        }
    }
    Ok(())
}

/// Cast all integer and Float32 columns to Float64 for consistent numeric
/// processing
pub(crate) fn cast_numeric_to_f64(df: &DataFrame) -> Result<DataFrame> {
    let mut result = df.clone();
    for col in df.get_columns() {
        match col.dtype() {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32 => {
                let casted = col.cast(&DataType::Float64)?;
                result.with_column(casted)?;
            }
            _ => {}
        }
    }
    Ok(result)
}

/// Names of the numeric columns, in frame order
pub(crate) fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| {
            matches!(
                col.dtype(),
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
                    | DataType::Float32
                    | DataType::Float64
            )
        })
        .map(|col| col.name().to_string())
        .collect()
}

/// Whether a column holds at least one finite value
pub(crate) fn has_finite_values(df: &DataFrame, name: &str) -> Result<bool> {
    Ok(to_f64_values(df, name)?
        .into_iter()
        .flatten()
        .any(|v| v.is_finite()))
}

/// Extract one column as `Vec<Option<f64>>`, casting if needed
pub(crate) fn to_f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| EnsembleSetError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let ca = series
        .f64()
        .map_err(|e| EnsembleSetError::DataError(e.to_string()))?;
    Ok(ca.into_iter().collect())
}

/// Build a Float64 series from optional values
pub(crate) fn f64_series(name: &str, values: Vec<Option<f64>>) -> Series {
    Series::new(name.into(), values)
}

// Parameter assignment accessors shared by the per-operation param structs.

pub(crate) fn ensure_known_keys(assignment: &ParamAssignment, allowed: &[&str]) -> Result<()> {
    for key in assignment.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(EnsembleSetError::InvalidParameter {
                name: key.clone(),
                value: assignment[key].to_string(),
                reason: "unknown hyperparameter for this operation".to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn param_usize(assignment: &ParamAssignment, key: &str) -> Result<Option<usize>> {
    match assignment.get(key) {
        None => Ok(None),
        Some(value) => {
            let v = value.as_i64().ok_or_else(|| EnsembleSetError::InvalidParameter {
                name: key.to_string(),
                value: value.to_string(),
                reason: "expected an integer".to_string(),
            })?;
            if v < 0 {
                return Err(EnsembleSetError::InvalidParameter {
                    name: key.to_string(),
                    value: value.to_string(),
                    reason: "must be non-negative".to_string(),
                });
            }
            Ok(Some(v as usize))
        }
    }
}

pub(crate) fn param_bool(assignment: &ParamAssignment, key: &str) -> Result<Option<bool>> {
    match assignment.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| EnsembleSetError::InvalidParameter {
                name: key.to_string(),
                value: value.to_string(),
                reason: "expected a boolean".to_string(),
            }),
    }
}

pub(crate) fn param_str<'a>(
    assignment: &'a ParamAssignment,
    key: &str,
) -> Result<Option<&'a str>> {
    match assignment.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| EnsembleSetError::InvalidParameter {
                name: key.to_string(),
                value: value.to_string(),
                reason: "expected a string".to_string(),
            }),
    }
}

/// Numeric parameter that may arrive as an int, a float, or a parseable
/// string such as "nan"
pub(crate) fn param_f64_lenient(assignment: &ParamAssignment, key: &str) -> Result<Option<f64>> {
    match assignment.get(key) {
        None => Ok(None),
        Some(value) => {
            if let Some(v) = value.as_f64() {
                return Ok(Some(v));
            }
            if let Some(s) = value.as_str() {
                if let Ok(v) = s.parse::<f64>() {
                    return Ok(Some(v));
                }
            }
            Err(EnsembleSetError::InvalidParameter {
                name: key.to_string(),
                value: value.to_string(),
                reason: "expected a number".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamValue;

    #[test]
    fn test_validate_targets_empty() {
        let df = df!("a" => &[1.0]).unwrap();
        assert!(matches!(
            validate_targets(&df, None, &[]),
            Err(EnsembleSetError::EmptyTargetFeatures)
        ));
    }

    #[test]
    fn test_validate_targets_missing_in_apply() {
        let fit = df!("a" => &[1.0], "b" => &[2.0]).unwrap();
        let apply = df!("a" => &[1.0]).unwrap();
        let targets = vec!["b".to_string()];
        assert!(matches!(
            validate_targets(&fit, Some(&apply), &targets),
            Err(EnsembleSetError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_cast_numeric_to_f64() {
        let df = df!("a" => &[1i64, 2, 3], "s" => &["x", "y", "z"]).unwrap();
        let casted = cast_numeric_to_f64(&df).unwrap();
        assert_eq!(casted.column("a").unwrap().dtype(), &DataType::Float64);
        assert_eq!(casted.column("s").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_numeric_columns_order() {
        let df = df!("a" => &[1.0], "s" => &["x"], "b" => &[2.0]).unwrap();
        assert_eq!(numeric_columns(&df), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut assignment = ParamAssignment::new();
        assignment.insert("bogus".to_string(), ParamValue::Int(1));
        let result = OperationParams::from_assignment(Operation::LogFeatures, &assignment);
        assert!(matches!(
            result,
            Err(EnsembleSetError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_lenient_f64_parses_nan_string() {
        let mut assignment = ParamAssignment::new();
        assignment.insert("div_zero_value".to_string(), ParamValue::Str("nan".to_string()));
        let value = param_f64_lenient(&assignment, "div_zero_value").unwrap().unwrap();
        assert!(value.is_nan());
    }
}
