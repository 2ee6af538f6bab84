//! Error types for the ensembleset crate

use thiserror::Error;

/// Result type alias for ensembleset operations
pub type Result<T> = std::result::Result<T, EnsembleSetError>;

/// Main error type for the ensembleset crate
#[derive(Error, Debug)]
pub enum EnsembleSetError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Operation requires a non-empty list of target features")]
    EmptyTargetFeatures,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Requested {requested} combination features but only {available} are available")]
    InsufficientFeatures { requested: usize, available: usize },

    #[error("Unknown category '{category}' in column '{column}'")]
    UnknownCategory { column: String, category: String },

    #[error("Value {value} in column '{column}' is outside the fitted range")]
    ValueOutOfRange { column: String, value: f64 },

    #[error("Transformer not fitted")]
    NotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for EnsembleSetError {
    fn from(err: polars::error::PolarsError) -> Self {
        EnsembleSetError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for EnsembleSetError {
    fn from(err: serde_json::Error) -> Self {
        EnsembleSetError::SerializationError(err.to_string())
    }
}
