//! Polynomial feature expansion
//!
//! Expands the target columns into all polynomial combinations up to a given
//! degree, including a bias term. With `interaction_only` set, pure powers
//! are excluded and only cross-products of distinct features remain. Term
//! naming follows the `1`, `a`, `a^2`, `a b` convention.

use super::{ensure_known_keys, f64_series, param_bool, param_usize, to_f64_values};
use crate::catalog::ParamAssignment;
use crate::error::{EnsembleSetError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Hyperparameters for polynomial expansion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolyParams {
    pub degree: usize,
    pub interaction_only: bool,
}

impl Default for PolyParams {
    fn default() -> Self {
        Self {
            degree: 2,
            interaction_only: false,
        }
    }
}

impl PolyParams {
    pub(crate) fn from_assignment(assignment: &ParamAssignment) -> Result<Self> {
        ensure_known_keys(assignment, &["degree", "interaction_only"])?;
        let mut params = Self::default();
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
        if let Some(interaction_only) = param_bool(assignment, "interaction_only")? {
            params.interaction_only = interaction_only;
        }
        Ok(params)
    }
}

/// Fitted polynomial basis: the input feature list and the enumerated terms.
///
/// Each term is a sorted multiset of feature indices; the empty term is the
/// bias column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolynomialBasis {
    params: PolyParams,
    feature_names: Vec<String>,
    terms: Vec<Vec<usize>>,
    is_fitted: bool,
}

impl PolynomialBasis {
    pub fn new(params: PolyParams) -> Self {
        Self {
            params,
            feature_names: Vec::new(),
            terms: Vec::new(),
            is_fitted: false,
        }
    }

    /// Enumerate the terms over the given feature list
    pub fn fit(&mut self, features: &[String]) -> Result<&mut Self> {
        self.feature_names = features.to_vec();
        self.terms = enumerate_terms(
            features.len(),
            self.params.degree,
            self.params.interaction_only,
        );
        self.is_fitted = true;
        Ok(self)
    }

    /// Evaluate every fitted term over `df`, returning one column per term
    pub fn transform(&self, df: &DataFrame) -> Result<Vec<Series>> {
        if !self.is_fitted {
            return Err(EnsembleSetError::NotFitted);
        }

        let columns: Vec<Vec<Option<f64>>> = self
            .feature_names
            .iter()
            .map(|name| to_f64_values(df, name))
            .collect::<Result<_>>()?;
        let height = df.height();

        let mut output = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let values: Vec<Option<f64>> = (0..height)
                .map(|row| {
                    let mut product = 1.0;
                    for &idx in term {
                        match columns[idx][row] {
                            Some(v) => product *= v,
                            None => return None,
                        }
                    }
                    Some(product)
                })
                .collect();
            output.push(f64_series(&self.term_name(term), values));
        }
        Ok(output)
    }

    /// Human-readable term name: `1`, `a`, `a^2`, `a b`
    fn term_name(&self, term: &[usize]) -> String {
        if term.is_empty() {
            return "1".to_string();
        }
        let mut parts: Vec<String> = Vec::new();
        let mut i = 0;
        while i < term.len() {
            let idx = term[i];
            let mut power = 1;
            while i + power < term.len() && term[i + power] == idx {
                power += 1;
            }
            let name = &self.feature_names[idx];
            if power == 1 {
                parts.push(name.clone());
            } else {
                parts.push(format!("{}^{}", name, power));
            }
            i += power;
        }
        parts.join(" ")
    }
}

/// All sorted index multisets of size 0..=degree. With `interaction_only`,
/// indices within a term are distinct (no pure powers).
fn enumerate_terms(n_features: usize, degree: usize, interaction_only: bool) -> Vec<Vec<usize>> {
    let mut terms = vec![Vec::new()];
    for size in 1..=degree {
        let mut current = Vec::with_capacity(size);
        push_combos(n_features, size, 0, interaction_only, &mut current, &mut terms);
    }
    terms
}

fn push_combos(
    n_features: usize,
    size: usize,
    start: usize,
    distinct: bool,
    current: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }
    for idx in start..n_features {
        current.push(idx);
        let next_start = if distinct { idx + 1 } else { idx };
        push_combos(n_features, size, next_start, distinct, current, out);
        current.pop();
    }
}

/// Polynomial-expand `features`: the basis is enumerated over the fit-time
/// feature list and evaluated identically on both tables; the original
/// target columns are dropped and replaced by the term columns.
pub(crate) fn poly_features(
    fit: DataFrame,
    apply: Option<DataFrame>,
    features: &[String],
    params: &PolyParams,
) -> Result<(DataFrame, Option<DataFrame>)> {
    let mut basis = PolynomialBasis::new(*params);
    basis.fit(features)?;

    let fit_out = replace_with_terms(&basis, &fit, features)?;
    let apply_out = match apply {
        Some(df) => Some(replace_with_terms(&basis, &df, features)?),
        None => None,
    };
    Ok((fit_out, apply_out))
}

fn replace_with_terms(
    basis: &PolynomialBasis,
    df: &DataFrame,
    features: &[String],
) -> Result<DataFrame> {
    let generated = basis.transform(df)?;
    let mut result = df.clone();
    for feature in features {
        result = result.drop(feature)?;
    }
    for series in generated {
        result.with_column(series)?;
    }
    Ok(result)
}
