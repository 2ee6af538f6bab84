//! Pipeline specification and execution
//!
//! A [`PipelineSpec`] is an ordered list of `(operation, parameters)` steps
//! produced by the sampler. Execution is a strict ordered fold: each step's
//! output pair is the next step's input pair, so a string-encoding step at
//! position 0 guarantees every later numeric operation sees a fully numeric
//! schema. Nothing here mutates caller-owned frames; execution consumes owned
//! copies and returns new ones.

use crate::catalog::{Operation, ParamAssignment};
use crate::error::{EnsembleSetError, Result};
use crate::ops::{self, OperationParams};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on the number of target columns any single engineering step
/// operates on. Column counts grow as a pipeline runs (polynomial and spline
/// steps replace k columns with many more); without a bound, chained steps
/// can grow the schema combinatorially. When the current numeric schema is
/// wider than this, a step targets the first `MAX_STEP_TARGETS` numeric
/// columns in frame order, which keeps execution deterministic.
pub const MAX_STEP_TARGETS: usize = 32;

/// One step of a pipeline: an operation plus its sampled hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub operation: Operation,
    pub parameters: ParamAssignment,
}

/// Ordered sequence of feature engineering steps.
///
/// Immutable once created; order is significant and preserved through
/// execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    steps: Vec<PipelineStep>,
}

impl PipelineSpec {
    /// Create a spec from an ordered list of steps
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    /// The ordered steps
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the spec has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Save the spec as JSON
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a spec from JSON
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let spec: Self = serde_json::from_str(&json)?;
        Ok(spec)
    }
}

/// Execute a pipeline specification over a `(fit, apply)` table pair.
///
/// The string-encoding step (if any) targets `string_features`; every
/// engineering step targets the numeric columns of the frame as it exists at
/// that step (capped at [`MAX_STEP_TARGETS`]). Columns with no finite fit
/// values are never targeted: chained substitutions (a zero-denominator
/// ratio followed by a sum, for instance) can leave a column entirely NaN,
/// and such columns pass through untouched rather than failing a later
/// fitting step. A step whose target list ends up empty is skipped. Fitted
/// parameters are always learned from the fit table and applied unmodified
/// to the apply table.
pub fn apply_pipeline(
    spec: &PipelineSpec,
    fit: DataFrame,
    apply: Option<DataFrame>,
    string_features: &[String],
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut fit = ops::cast_numeric_to_f64(&fit)?;
    let mut apply = match apply {
        Some(df) => Some(ops::cast_numeric_to_f64(&df)?),
        None => None,
    };

    for step in spec.steps() {
        let targets: Vec<String> = if step.operation.is_string_encoding() {
            if string_features.is_empty() {
                return Err(EnsembleSetError::EmptyTargetFeatures);
            }
            string_features.to_vec()
        } else {
            let numeric = ops::numeric_columns(&fit);
            if numeric.is_empty() {
                return Err(EnsembleSetError::EmptyTargetFeatures);
            }
            let mut targets = Vec::new();
            for name in numeric {
                if targets.len() == MAX_STEP_TARGETS {
                    break;
                }
                if ops::has_finite_values(&fit, &name)? {
                    targets.push(name);
                }
            }
            if targets.is_empty() {
                debug!(
                    operation = step.operation.name(),
                    "skipping step: no numeric columns with finite values"
                );
                continue;
            }
            targets
        };

        debug!(
            operation = step.operation.name(),
            targets = targets.len(),
            "applying pipeline step"
        );

        let params = OperationParams::from_assignment(step.operation, &step.parameters)?;
        let (next_fit, next_apply) =
            ops::apply_operation(step.operation, &params, fit, apply, &targets)?;
        fit = next_fit;
        apply = next_apply;
    }

    Ok((fit, apply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamValue;

    fn log_step() -> PipelineStep {
        let mut parameters = ParamAssignment::new();
        parameters.insert("base".to_string(), ParamValue::Str("e".to_string()));
        PipelineStep {
            operation: Operation::LogFeatures,
            parameters,
        }
    }

    #[test]
    fn test_spec_json_round_trip() {
        let spec = PipelineSpec::new(vec![log_step()]);
        let json = serde_json::to_string(&spec).unwrap();
        let restored: PipelineSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, restored);
    }

    #[test]
    fn test_apply_single_step() {
        let spec = PipelineSpec::new(vec![log_step()]);
        let df = df!("feature1" => &[1.0, 2.0, 4.0]).unwrap();

        let (fit, apply) = apply_pipeline(&spec, df.clone(), Some(df), &[]).unwrap();
        let apply = apply.unwrap();

        let fit_vals: Vec<f64> = fit
            .column("feature1")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!((fit_vals[0] - 0.0).abs() < 1e-12);
        assert!((fit_vals[1] - 2.0_f64.ln()).abs() < 1e-12);
        assert!(fit.equals(&apply));
    }

    #[test]
    fn test_string_step_without_string_features_fails() {
        let spec = PipelineSpec::new(vec![PipelineStep {
            operation: Operation::OnehotEncoding,
            parameters: ParamAssignment::new(),
        }]);
        let df = df!("feature1" => &[1.0, 2.0]).unwrap();
        let result = apply_pipeline(&spec, df, None, &[]);
        assert!(matches!(result, Err(EnsembleSetError::EmptyTargetFeatures)));
    }

    #[test]
    fn test_non_finite_columns_pass_through_fitting_steps() {
        // A zero denominator column makes a_over_z entirely NaN; the spline
        // step must leave it alone instead of failing to place knots.
        let mut ratio_params = ParamAssignment::new();
        ratio_params.insert(
            "div_zero_value".to_string(),
            ParamValue::Str("nan".to_string()),
        );
        let mut spline_params = ParamAssignment::new();
        spline_params.insert("n_knots".to_string(), ParamValue::Int(3));
        spline_params.insert("degree".to_string(), ParamValue::Int(2));

        let spec = PipelineSpec::new(vec![
            PipelineStep {
                operation: Operation::RatioFeatures,
                parameters: ratio_params,
            },
            PipelineStep {
                operation: Operation::SplineFeatures,
                parameters: spline_params,
            },
        ]);
        let df = df!("a" => &[1.0, 2.0, 3.0], "z" => &[0.0, 0.0, 0.0]).unwrap();

        let (fit, _) = apply_pipeline(&spec, df, None, &[]).unwrap();
        let ratios = fit.column("a_over_z").unwrap().f64().unwrap();
        assert!(ratios.into_iter().flatten().all(|v| v.is_nan()));
        assert!(fit.column("a_sp_0").is_ok());
    }

    #[test]
    fn test_missing_apply_table_stays_absent() {
        let spec = PipelineSpec::new(vec![log_step()]);
        let df = df!("feature1" => &[1.0, 2.0, 4.0]).unwrap();
        let (_, apply) = apply_pipeline(&spec, df, None, &[]).unwrap();
        assert!(apply.is_none());
    }
}
