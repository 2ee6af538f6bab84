//! Random pipeline sampling
//!
//! [`PipelineSampler`] draws one randomly ordered, randomly parameterized
//! pipeline specification from an [`OperationCatalog`]. When string features
//! are declared, exactly one string-encoding operation is placed first so
//! that every later numeric operation sees a fully numeric schema.

use crate::catalog::{OperationCatalog, Operation, ParamAssignment, ParamDomains};
use crate::error::{EnsembleSetError, Result};
use crate::pipeline::{PipelineSpec, PipelineStep};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Samples random feature engineering pipelines from an operation catalog
#[derive(Debug, Clone)]
pub struct PipelineSampler {
    catalog: OperationCatalog,
    has_string_features: bool,
    seed: Option<u64>,
}

impl PipelineSampler {
    /// Create a new sampler over the given catalog. `has_string_features`
    /// controls whether a string-encoding step is emitted.
    pub fn new(catalog: OperationCatalog, has_string_features: bool) -> Self {
        Self {
            catalog,
            has_string_features,
            seed: None,
        }
    }

    /// Set a random seed for reproducible sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sample one pipeline specification.
    ///
    /// The returned spec contains every engineering operation of the catalog
    /// exactly once, in uniformly random order, each with one value drawn
    /// uniformly from every hyperparameter domain. If string features were
    /// declared, one string encoding chosen uniformly at random is placed as
    /// step 0.
    pub fn sample(&self) -> Result<PipelineSpec> {
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut steps = Vec::new();

        if self.has_string_features {
            let options: Vec<(Operation, &ParamDomains)> = self
                .catalog
                .string_encodings()
                .iter()
                .map(|(op, domains)| (*op, domains))
                .collect();
            let (operation, domains) = *options.choose(&mut rng).ok_or_else(|| {
                EnsembleSetError::InvalidArgument(
                    "string features declared but the catalog has no string encodings"
                        .to_string(),
                )
            })?;
            steps.push(PipelineStep {
                operation,
                parameters: Self::sample_assignment(domains, &mut rng)?,
            });
        }

        let mut operations: Vec<(Operation, &ParamDomains)> = self
            .catalog
            .engineerings()
            .iter()
            .map(|(op, domains)| (*op, domains))
            .collect();
        operations.shuffle(&mut rng);

        for (operation, domains) in operations {
            steps.push(PipelineStep {
                operation,
                parameters: Self::sample_assignment(domains, &mut rng)?,
            });
        }

        Ok(PipelineSpec::new(steps))
    }

    /// Draw one value uniformly at random from every hyperparameter domain
    fn sample_assignment(domains: &ParamDomains, rng: &mut ChaCha8Rng) -> Result<ParamAssignment> {
        let mut assignment = ParamAssignment::new();
        for (name, values) in domains {
            let value = values.choose(rng).ok_or_else(|| {
                EnsembleSetError::InvalidParameter {
                    name: name.clone(),
                    value: "<none>".to_string(),
                    reason: "hyperparameter domain is empty".to_string(),
                }
            })?;
            assignment.insert(name.clone(), value.clone());
        }
        Ok(assignment)
    }
}
