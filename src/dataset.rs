//! Ensemble dataset generation
//!
//! [`DataSet`] holds a train table, an optional test table, and the declared
//! string features, and turns sampled pipeline specifications into materialized
//! feature sets on disk. Each generated dataset is written as a parquet pair
//! under `train/` and `test/` inside the output directory.

use crate::catalog::OperationCatalog;
use crate::error::{EnsembleSetError, Result};
use crate::pipeline::{apply_pipeline, PipelineSpec};
use crate::sampler::PipelineSampler;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One generated dataset: the pipeline that produced it and where it landed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDataset {
    pub index: usize,
    pub spec: PipelineSpec,
    pub train_path: PathBuf,
    pub test_path: Option<PathBuf>,
}

/// Generates randomized feature-engineered variants of a train/test pair
#[derive(Debug, Clone)]
pub struct DataSet {
    output_path: PathBuf,
    train_data: DataFrame,
    test_data: Option<DataFrame>,
    string_features: Vec<String>,
    catalog: OperationCatalog,
    seed: Option<u64>,
}

impl DataSet {
    /// Create a dataset generator.
    ///
    /// Validates that the test table (when present) carries the same column
    /// names as the train table and that every declared string feature exists
    /// in the train table with string dtype, then creates the `train/` and
    /// `test/` output directories.
    pub fn new(
        output_path: impl AsRef<Path>,
        train_data: DataFrame,
        test_data: Option<DataFrame>,
        string_features: Option<Vec<String>>,
    ) -> Result<Self> {
        let string_features = string_features.unwrap_or_default();

        if let Some(test) = &test_data {
            let train_cols: Vec<&str> =
                train_data.get_columns().iter().map(|c| c.name().as_str()).collect();
            let test_cols: Vec<&str> =
                test.get_columns().iter().map(|c| c.name().as_str()).collect();
            if train_cols != test_cols {
                return Err(EnsembleSetError::InvalidArgument(
                    "train and test tables must have identical column names".to_string(),
                ));
            }
        }

        for feature in &string_features {
            let column = train_data
                .column(feature)
                .map_err(|_| EnsembleSetError::FeatureNotFound(feature.clone()))?;
            if column.dtype() != &DataType::String {
                return Err(EnsembleSetError::InvalidArgument(format!(
                    "declared string feature '{}' has dtype {}",
                    feature,
                    column.dtype()
                )));
            }
        }

        let output_path = output_path.as_ref().to_path_buf();
        fs::create_dir_all(output_path.join("train"))?;
        fs::create_dir_all(output_path.join("test"))?;

        info!(
            output = %output_path.display(),
            rows = train_data.height(),
            columns = train_data.width(),
            has_test = test_data.is_some(),
            string_features = string_features.len(),
            "initialized dataset generator"
        );

        Ok(Self {
            output_path,
            train_data,
            test_data,
            string_features,
            catalog: OperationCatalog::default(),
            seed: None,
        })
    }

    /// Replace the default operation catalog
    pub fn with_catalog(mut self, catalog: OperationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set a base seed for reproducible generation
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The declared string features
    pub fn string_features(&self) -> &[String] {
        &self.string_features
    }

    /// Sample one pipeline specification from the catalog
    pub fn generate_pipeline(&self) -> Result<PipelineSpec> {
        self.sampler(self.seed).sample()
    }

    /// Execute one pipeline over the held train/test pair, fitting on train
    /// only
    pub fn apply_pipeline(&self, spec: &PipelineSpec) -> Result<(DataFrame, Option<DataFrame>)> {
        apply_pipeline(
            spec,
            self.train_data.clone(),
            self.test_data.clone(),
            &self.string_features,
        )
    }

    /// Generate `n` datasets, each from an independently sampled pipeline,
    /// and write them as parquet files under the output directory.
    ///
    /// Pipelines are sampled sequentially so a base seed yields a stable
    /// sequence; execution and writing run in parallel.
    pub fn make_datasets(&self, n: usize) -> Result<Vec<GeneratedDataset>> {
        let specs: Vec<(usize, PipelineSpec)> = (0..n)
            .map(|i| {
                let seed = self.seed.map(|s| s.wrapping_add(i as u64));
                Ok((i, self.sampler(seed).sample()?))
            })
            .collect::<Result<_>>()?;

        let mut datasets: Vec<GeneratedDataset> = specs
            .into_par_iter()
            .map(|(index, spec)| {
                let (train, test) = self.apply_pipeline(&spec)?;

                let train_path = self
                    .output_path
                    .join("train")
                    .join(format!("dataset_{}.parquet", index));
                write_parquet(train, &train_path)?;

                let test_path = match test {
                    Some(df) => {
                        let path = self
                            .output_path
                            .join("test")
                            .join(format!("dataset_{}.parquet", index));
                        write_parquet(df, &path)?;
                        Some(path)
                    }
                    None => None,
                };

                debug!(index, steps = spec.len(), "wrote dataset");
                Ok(GeneratedDataset {
                    index,
                    spec,
                    train_path,
                    test_path,
                })
            })
            .collect::<Result<_>>()?;

        datasets.sort_by_key(|d| d.index);
        info!(count = datasets.len(), "dataset generation finished");
        Ok(datasets)
    }

    fn sampler(&self, seed: Option<u64>) -> PipelineSampler {
        let sampler =
            PipelineSampler::new(self.catalog.clone(), !self.string_features.is_empty());
        match seed {
            Some(seed) => sampler.with_seed(seed),
            None => sampler,
        }
    }
}

fn write_parquet(mut df: DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    Ok(())
}
