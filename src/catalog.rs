//! Operation catalog: the registry of available feature engineering
//! operations and the legal discrete values of their hyperparameters.
//!
//! The catalog is static configuration supplied at construction. Callers can
//! override or narrow the hyperparameter domains without touching the sampler
//! logic; the sampler only ever draws from whatever domains the catalog holds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A feature engineering operation known to the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Categorical -> binary indicator columns, one per observed category
    OnehotEncoding,
    /// Categorical -> integer rank per observed category
    OrdinalEncoding,
    /// Polynomial expansion up to a given degree
    PolyFeatures,
    /// B-spline basis expansion
    SplineFeatures,
    /// Elementwise logarithm
    LogFeatures,
    /// Pairwise column ratios
    RatioFeatures,
    /// Elementwise exponential
    ExponentialFeatures,
    /// Sums over sliding windows of target columns
    SumFeatures,
    /// Chained differences over sliding windows of target columns
    DifferenceFeatures,
}

impl Operation {
    /// Stable string name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::OnehotEncoding => "onehot_encoding",
            Operation::OrdinalEncoding => "ordinal_encoding",
            Operation::PolyFeatures => "poly_features",
            Operation::SplineFeatures => "spline_features",
            Operation::LogFeatures => "log_features",
            Operation::RatioFeatures => "ratio_features",
            Operation::ExponentialFeatures => "exponential_features",
            Operation::SumFeatures => "sum_features",
            Operation::DifferenceFeatures => "difference_features",
        }
    }

    /// Whether this operation encodes string columns (and therefore must run
    /// before any numeric operation)
    pub fn is_string_encoding(&self) -> bool {
        matches!(self, Operation::OnehotEncoding | Operation::OrdinalEncoding)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single discrete hyperparameter value.
///
/// Values that are awkward to carry as raw floats (e.g. NaN sentinels, log
/// bases) are represented as strings and parsed by the owning operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

/// Legal values per hyperparameter name
pub type ParamDomains = BTreeMap<String, Vec<ParamValue>>;

/// One concrete hyperparameter assignment, as sampled from the domains
pub type ParamAssignment = BTreeMap<String, ParamValue>;

/// Registry of operations and their hyperparameter domains, split into the
/// string-encoding sub-catalog and the numeric engineering sub-catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCatalog {
    string_encodings: BTreeMap<Operation, ParamDomains>,
    engineerings: BTreeMap<Operation, ParamDomains>,
}

fn domains(entries: &[(&str, &[ParamValue])]) -> ParamDomains {
    entries
        .iter()
        .map(|(name, values)| (name.to_string(), values.to_vec()))
        .collect()
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Int(v)).collect()
}

fn strs(values: &[&str]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Str(v.to_string())).collect()
}

impl Default for OperationCatalog {
    fn default() -> Self {
        let mut string_encodings = BTreeMap::new();
        // Encoders run with their operation defaults; the empty domains
        // leave room for randomizing encoder parameters later.
        string_encodings.insert(Operation::OnehotEncoding, ParamDomains::new());
        string_encodings.insert(Operation::OrdinalEncoding, ParamDomains::new());

        let mut engineerings = BTreeMap::new();
        engineerings.insert(
            Operation::PolyFeatures,
            domains(&[
                ("degree", &ints(&[2, 3])),
                ("interaction_only", &[ParamValue::Bool(true), ParamValue::Bool(false)]),
            ]),
        );
        engineerings.insert(
            Operation::SplineFeatures,
            domains(&[
                ("n_knots", &ints(&[3, 4, 5])),
                ("degree", &ints(&[2, 3, 4])),
                ("knots", &strs(&["uniform", "quantile"])),
                (
                    "extrapolation",
                    &strs(&["error", "constant", "linear", "continue", "periodic"]),
                ),
            ]),
        );
        engineerings.insert(
            Operation::LogFeatures,
            domains(&[("base", &strs(&["2", "e", "10"]))]),
        );
        engineerings.insert(
            Operation::RatioFeatures,
            domains(&[("div_zero_value", &strs(&["nan"]))]),
        );
        engineerings.insert(
            Operation::ExponentialFeatures,
            domains(&[("base", &strs(&["2", "e"]))]),
        );
        engineerings.insert(
            Operation::SumFeatures,
            domains(&[("n_addends", &ints(&[2, 3]))]),
        );
        engineerings.insert(
            Operation::DifferenceFeatures,
            domains(&[("n_subtrahends", &ints(&[2, 3]))]),
        );

        Self {
            string_encodings,
            engineerings,
        }
    }
}

impl OperationCatalog {
    /// Create the default catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with no operations; populate via [`with_domains`](Self::with_domains)
    pub fn empty() -> Self {
        Self {
            string_encodings: BTreeMap::new(),
            engineerings: BTreeMap::new(),
        }
    }

    /// Builder method to set (or override) the domains of one operation.
    /// The operation is routed to the string-encoding or engineering
    /// sub-catalog based on its kind.
    pub fn with_domains(mut self, operation: Operation, domains: ParamDomains) -> Self {
        if operation.is_string_encoding() {
            self.string_encodings.insert(operation, domains);
        } else {
            self.engineerings.insert(operation, domains);
        }
        self
    }

    /// Builder method to remove one operation from the catalog
    pub fn without_operation(mut self, operation: Operation) -> Self {
        self.string_encodings.remove(&operation);
        self.engineerings.remove(&operation);
        self
    }

    /// String-encoding sub-catalog
    pub fn string_encodings(&self) -> &BTreeMap<Operation, ParamDomains> {
        &self.string_encodings
    }

    /// Numeric engineering sub-catalog
    pub fn engineerings(&self) -> &BTreeMap<Operation, ParamDomains> {
        &self.engineerings
    }

    /// Look up the domains of an operation in either sub-catalog
    pub fn domains_for(&self, operation: Operation) -> Option<&ParamDomains> {
        self.string_encodings
            .get(&operation)
            .or_else(|| self.engineerings.get(&operation))
    }
}
