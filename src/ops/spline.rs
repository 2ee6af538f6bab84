//! B-spline feature expansion
//!
//! Expands each target column into a B-spline basis fitted on the fit table:
//! knots are placed uniformly or at quantiles of the observed values, then
//! each value is evaluated against every basis function via the Cox-de Boor
//! recursion. Values outside the fitted range are handled by the configured
//! extrapolation policy.

use super::{ensure_known_keys, f64_series, param_str, param_usize, to_f64_values};
use crate::catalog::ParamAssignment;
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Knot placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnotStrategy {
    Uniform,
    Quantile,
}

impl KnotStrategy {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "quantile" => Ok(Self::Quantile),
            other => Err(EnsembleSetError::InvalidParameter {
                name: "knots".to_string(),
                value: other.to_string(),
                reason: "expected 'uniform' or 'quantile'".to_string(),
            }),
        }
    }
}

/// Behavior for values outside the range seen at fit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extrapolation {
    /// Reject out-of-range values
    Error,
    /// Evaluate at the nearest boundary
    Constant,
    /// Extend linearly from the boundary using the basis derivative
    Linear,
    /// Evaluate the boundary polynomial pieces directly
    Continue,
    /// Wrap the value back into the fitted range
    Periodic,
}

impl Extrapolation {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "error" => Ok(Self::Error),
            "constant" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            "continue" => Ok(Self::Continue),
            "periodic" => Ok(Self::Periodic),
            other => Err(EnsembleSetError::InvalidParameter {
                name: "extrapolation".to_string(),
                value: other.to_string(),
                reason: "expected one of error, constant, linear, continue, periodic"
                    .to_string(),
            }),
        }
    }
}

/// Hyperparameters for spline expansion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineParams {
    pub n_knots: usize,
    pub degree: usize,
    pub knots: KnotStrategy,
    pub extrapolation: Extrapolation,
}

impl Default for SplineParams {
    fn default() -> Self {
        Self {
            n_knots: 5,
            degree: 3,
            knots: KnotStrategy::Uniform,
            extrapolation: Extrapolation::Constant,
        }
    }
}

impl SplineParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["n_knots", "degree", "knots", "extrapolation"])?;
        let mut params = Self::default();
        if let Some(n_knots) = param_usize(assignment, "n_knots")? {
            if n_knots < 2 {
                return Err(EnsembleSetError::InvalidParameter {
                    name: "n_knots".to_string(),
                    value: n_knots.to_string(),
                    reason: "must be at least 2".to_string(),
                });
            }
            params.n_knots = n_knots;
        }
        if let Some(degree) = param_usize(assignment, "degree")? {
            if degree < 1 {
                return Err(EnsembleSetError::InvalidParameter {
                    name: "degree".to_string(),
                    value: degree.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            params.degree = degree;
        }
        if let Some(s) = param_str(assignment, "knots")? {
            params.knots = KnotStrategy::parse(s)?;
        }
        if let Some(s) = param_str(assignment, "extrapolation")? {
            params.extrapolation = Extrapolation::parse(s)?;
        }
        Ok(params)
    }
}

/// Fitted spline basis for one column: the extended knot vector plus the
/// observed value range.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureSpline {
    knots: Vec<f64>,
    n_base_knots: usize,
    degree: usize,
    x_min: f64,
    x_max: f64,
}

impl FeatureSpline {
    fn fit(values: &[f64], params: &SplineParams, column: &str) -> Result<Self> {
        if values.is_empty() {
            return Err(EnsembleSetError::DataError(format!(
                "column '{}' has no finite values to fit spline knots on",
                column
            )));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let x_min = sorted[0];
        let x_max = sorted[sorted.len() - 1];

        let base = match params.knots {
            KnotStrategy::Uniform => linspace(x_min, x_max, params.n_knots),
            KnotStrategy::Quantile => quantile_points(&sorted, params.n_knots),
        };

        // Extend `degree` knots beyond each boundary using the edge spacing,
        // falling back to unit spacing when the fitted range is degenerate.
        let first_gap = positive_or(base[1] - base[0], 1.0);
        let last_gap = positive_or(base[params.n_knots - 1] - base[params.n_knots - 2], 1.0);

        let mut knots = Vec::with_capacity(params.n_knots + 2 * params.degree);
        for i in (1..=params.degree).rev() {
            knots.push(base[0] - i as f64 * first_gap);
        }
        knots.extend_from_slice(&base);
        for i in 1..=params.degree {
            knots.push(base[params.n_knots - 1] + i as f64 * last_gap);
        }

        Ok(Self {
            knots,
            n_base_knots: params.n_knots,
            degree: params.degree,
            x_min,
            x_max,
        })
    }

    /// Number of basis columns this spline produces
    fn n_bases(&self) -> usize {
        self.n_base_knots + self.degree - 1
    }

    /// Index of the knot interval containing `x`, clamped to the base range
    /// so out-of-range values evaluate against the boundary pieces
    fn interval(&self, x: f64) -> usize {
        let lo = self.degree;
        let hi = self.degree + self.n_base_knots - 2;
        let mut k = lo;
        for j in lo..=hi {
            if self.knots[j] <= x {
                k = j;
            }
        }
        k
    }

    /// All basis function values at `x` for the given degree, via the
    /// Cox-de Boor recursion with zero-denominator guards
    fn eval_degree(&self, x: f64, degree: usize) -> Vec<f64> {
        let t = &self.knots;
        let mut b = vec![0.0; t.len() - 1];
        b[self.interval(x)] = 1.0;

        for p in 1..=degree {
            let mut next = vec![0.0; t.len() - 1 - p];
            for (i, slot) in next.iter_mut().enumerate() {
                let mut v = 0.0;
                let left = t[i + p] - t[i];
                if left > 0.0 {
                    v += (x - t[i]) / left * b[i];
                }
                let right = t[i + p + 1] - t[i + 1];
                if right > 0.0 {
                    v += (t[i + p + 1] - x) / right * b[i + 1];
                }
                *slot = v;
            }
            b = next;
        }
        b
    }

    /// Basis values at `x` for the fitted degree; the extended knot vector
    /// yields exactly `n_bases` functions
    fn basis(&self, x: f64) -> Vec<f64> {
        let full = self.eval_degree(x, self.degree);
        debug_assert_eq!(full.len(), self.n_bases());
        full
    }

    /// Derivatives of the basis functions at `x`
    fn basis_derivative(&self, x: f64) -> Vec<f64> {
        let p = self.degree;
        let t = &self.knots;
        let lower = self.eval_degree(x, p - 1);

        let n = t.len() - p - 1;
        let mut deriv = vec![0.0; n];
        for (i, slot) in deriv.iter_mut().enumerate() {
            let mut v = 0.0;
            let left = t[i + p] - t[i];
            if left > 0.0 {
                v += lower[i] / left;
            }
            let right = t[i + p + 1] - t[i + 1];
            if right > 0.0 {
                v -= lower[i + 1] / right;
            }
            *slot = p as f64 * v;
        }
        deriv
    }

    /// Evaluate the basis row for `x` under the fitted extrapolation policy
    fn evaluate(
        &self,
        x: f64,
        extrapolation: Extrapolation,
        column: &str,
    ) -> Result<Vec<f64>> {
        if !x.is_finite() {
            return Ok(vec![f64::NAN; self.n_bases()]);
        }

        let in_range = x >= self.x_min && x <= self.x_max;
        if in_range {
            return Ok(self.basis(x));
        }

        match extrapolation {
            Extrapolation::Error => Err(EnsembleSetError::ValueOutOfRange {
                column: column.to_string(),
                value: x,
            }),
            Extrapolation::Constant => Ok(self.basis(x.clamp(self.x_min, self.x_max))),
            Extrapolation::Continue => Ok(self.basis(x)),
            Extrapolation::Linear => {
                let boundary = x.clamp(self.x_min, self.x_max);
                let values = self.basis(boundary);
                let slopes = self.basis_derivative(boundary);
                Ok(values
                    .iter()
                    .zip(slopes.iter())
                    .map(|(v, s)| v + (x - boundary) * s)
                    .collect())
            }
            Extrapolation::Periodic => {
                let period = self.x_max - self.x_min;
                let wrapped = if period > 0.0 {
                    self.x_min + (x - self.x_min).rem_euclid(period)
                } else {
                    self.x_min
                };
                Ok(self.basis(wrapped))
            }
        }
    }
}

/// Fitted spline expansion over a set of columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplineExpansion {
    params: SplineParams,
    splines: Vec<(String, FeatureSpline)>,
    is_fitted: bool,
}

impl SplineExpansion {
    pub fn new(params: SplineParams) -> Self {
        Self {
            params,
            splines: Vec::new(),
            is_fitted: false,
        }
    }

    /// Place knots per column from the fit table's finite values
    pub fn fit(&mut self, df: &DataFrame, features: &[String]) -> Result<&mut Self> {
        self.splines.clear();
        for feature in features {
            let finite: Vec<f64> = to_f64_values(df, feature)?
                .into_iter()
                .flatten()
                .filter(|v| v.is_finite())
                .collect();
            let spline = FeatureSpline::fit(&finite, &self.params, feature)?;
            self.splines.push((feature.clone(), spline));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Evaluate every fitted spline basis over `df`, one column per basis
    /// function, named `{feature}_sp_{i}`
    pub fn transform(&self, df: &DataFrame) -> Result<Vec<Series>> {
        if !self.is_fitted {
            return Err(EnsembleSetError::NotFitted);
        }

        let mut output = Vec::new();
        for (feature, spline) in &self.splines {
            let values = to_f64_values(df, feature)?;
            let n_bases = spline.n_bases();
            let mut columns: Vec<Vec<Option<f64>>> =
                vec![Vec::with_capacity(values.len()); n_bases];

            for value in values {
                match value {
                    None => {
                        for col in columns.iter_mut() {
                            col.push(None);
                        }
                    }
                    Some(x) => {
                        let row = spline.evaluate(x, self.params.extrapolation, feature)?;
                        for (col, v) in columns.iter_mut().zip(row) {
                            col.push(Some(v));
                        }
                    }
                }
            }

            for (i, col) in columns.into_iter().enumerate() {
                output.push(f64_series(&format!("{}_sp_{}", feature, i), col));
            }
        }
        Ok(output)
    }
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + i as f64 * step).collect()
}

/// Quantile knot positions over sorted values, linear interpolation between
/// order statistics
fn quantile_points(sorted: &[f64], n: usize) -> Vec<f64> {
    let last = (sorted.len() - 1) as f64;
    (0..n)
        .map(|i| {
            let pos = i as f64 / (n - 1) as f64 * last;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            if idx + 1 < sorted.len() {
                sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac
            } else {
                sorted[idx]
            }
        })
        .collect()
}

fn positive_or(v: f64, fallback: f64) -> f64 {
    if v > 0.0 {
        v
    } else {
        fallback
    }
}

/// Spline-expand `features`: knots are placed on the fit table and the same
/// basis is evaluated on both tables; the original target columns are dropped
/// and replaced by the basis columns.
pub(crate) fn spline_features(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &SplineParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut expansion = SplineExpansion::new(*params);
    expansion.fit(&fit, features)?;

    let fit_out = replace_with_basis(&expansion, &fit, features)?;
    let apply_out = match apply {
        Some(df) => Some(replace_with_basis(&expansion, &df, features)?),
        None => None,
    };
    Ok((fit_out, apply_out))
}

fn replace_with_basis(
    expansion: &SplineExpansion,
    df: &DataFrame,
    features: &[String],
) -> Result<DataFrame> {
    let generated = expansion.transform(df)?;
    let mut result = df.clone();
    for feature in features {
        result = result.drop(feature)?;
    }
    for series in generated {
        result.with_column(series)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_spline(values: &[f64], params: &SplineParams) -> FeatureSpline {
        FeatureSpline::fit(values, params, "a").unwrap()
    }

    #[test]
    fn test_basis_count() {
        let params = SplineParams {
            n_knots: 4,
            degree: 3,
            ..SplineParams::default()
        };
        let spline = fit_spline(&[0.0, 1.0, 2.0, 3.0], &params);
        assert_eq!(spline.n_bases(), 6);
        assert_eq!(spline.basis(1.5).len(), 6);
    }

    #[test]
    fn test_partition_of_unity_inside_range() {
        let params = SplineParams::default();
        let spline = fit_spline(&[0.0, 2.5, 5.0, 7.5, 10.0], &params);
        for &x in &[0.0, 1.3, 4.99, 7.0, 10.0] {
            let sum: f64 = spline.eval_degree(x, params.degree).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum at {x} was {sum}");
        }
    }

    #[test]
    fn test_error_policy_rejects_out_of_range() {
        let params = SplineParams {
            extrapolation: Extrapolation::Error,
            ..SplineParams::default()
        };
        let spline = fit_spline(&[0.0, 5.0, 10.0], &params);
        let result = spline.evaluate(11.0, Extrapolation::Error, "a");
        assert!(matches!(
            result,
            Err(EnsembleSetError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_constant_policy_clamps() {
        let params = SplineParams::default();
        let spline = fit_spline(&[0.0, 5.0, 10.0], &params);
        let outside = spline
            .evaluate(15.0, Extrapolation::Constant, "a")
            .unwrap();
        let boundary = spline
            .evaluate(10.0, Extrapolation::Constant, "a")
            .unwrap();
        assert_eq!(outside, boundary);
    }

    #[test]
    fn test_periodic_policy_wraps() {
        let params = SplineParams::default();
        let spline = fit_spline(&[0.0, 5.0, 10.0], &params);
        let wrapped = spline
            .evaluate(12.5, Extrapolation::Periodic, "a")
            .unwrap();
        let direct = spline
            .evaluate(2.5, Extrapolation::Periodic, "a")
            .unwrap();
        for (a, b) in wrapped.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spline_features_replaces_columns() {
        let df = df!("a" => &[0.0, 1.0, 2.0, 3.0, 4.0], "keep" => &["x", "x", "x", "x", "x"])
            .unwrap();
        let features = vec!["a".to_string()];
        let params = SplineParams {
            n_knots: 3,
            degree: 2,
            ..SplineParams::default()
        };
        let (fit, _) = spline_features(df, None, &features, &params).unwrap();

        assert!(fit.column("a").is_err());
        assert!(fit.column("keep").is_ok());
        for i in 0..4 {
            assert!(fit.column(&format!("a_sp_{}", i)).is_ok());
        }
        assert!(fit.column("a_sp_4").is_err());
    }

    #[test]
    fn test_apply_uses_fit_knots() {
        let fit = df!("a" => &[0.0, 5.0, 10.0]).unwrap();
        let apply = df!("a" => &[5.0]).unwrap();
        let features = vec!["a".to_string()];
        let params = SplineParams {
            n_knots: 3,
            degree: 2,
            ..SplineParams::default()
        };

        let (fit_out, apply_out) =
            spline_features(fit, Some(apply), &features, &params).unwrap();
        let apply_out = apply_out.unwrap();

        // Row with value 5.0 must produce identical basis values in both
        for i in 0..4 {
            let name = format!("a_sp_{}", i);
            let from_fit = fit_out.column(&name).unwrap().f64().unwrap().get(1).unwrap();
            let from_apply = apply_out.column(&name).unwrap().f64().unwrap().get(0).unwrap();
            assert!((from_fit - from_apply).abs() < 1e-12);
        }
    }
}
