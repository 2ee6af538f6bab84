//! # EnsembleSet
//!
//! Randomized feature engineering for tabular data. EnsembleSet samples
//! random pipelines of feature engineering operations and applies them to a
//! train/test pair of [`polars`] DataFrames, producing an ensemble of
//! differently engineered views of the same data.
//!
//! Every operation follows a strict fit/apply contract: parameters are fitted
//! on the fit table only and applied unmodified to the apply table, so
//! nothing learned from test data ever leaks into the transform.
//!
//! # Modules
//!
//! - [`catalog`] - Operation catalog and hyperparameter domains
//! - [`sampler`] - Random pipeline sampling
//! - [`pipeline`] - Pipeline specifications and ordered execution
//! - [`ops`] - Feature engineering operation library
//! - [`dataset`] - Dataset generation and parquet output
//! - [`error`] - Error types
//!
//! # Quick start
//!
//! ```no_run
//! use ensembleset::prelude::*;
//! use polars::prelude::*;
//!
//! # fn main() -> ensembleset::Result<()> {
//! let train = df!(
//!     "age" => &[34.0, 51.0, 29.0],
//!     "income" => &[48_000.0, 62_000.0, 39_000.0],
//!     "segment" => &["a", "b", "a"],
//! )?;
//!
//! let dataset = DataSet::new(
//!     "output",
//!     train,
//!     None,
//!     Some(vec!["segment".to_string()]),
//! )?
//! .with_seed(42);
//!
//! let generated = dataset.make_datasets(10)?;
//! assert_eq!(generated.len(), 10);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod dataset;
pub mod error;
pub mod ops;
pub mod pipeline;
pub mod sampler;

pub use error::{EnsembleSetError, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::catalog::{Operation, OperationCatalog, ParamValue};
    pub use crate::dataset::{DataSet, GeneratedDataset};
    pub use crate::error::{EnsembleSetError, Result};
    pub use crate::pipeline::{apply_pipeline, PipelineSpec, PipelineStep};
    pub use crate::sampler::PipelineSampler;
}
