//! Engine builder.
//!
//! `ParallelMlpBuilder` is the recommended way to create a [`ParallelMlp`].
//!
//! It turns a search-space description ([`ArchitectureConfig`]) into model-id arrays and
//! builds the engine from them, so the ids and the activation list always agree.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    ArchitectureConfig, Error, ParallelMlp, ParallelMlpConfig, Result, build_model_ids,
};

#[derive(Debug, Clone)]
/// Builder for a `ParallelMlp`.
///
/// Example:
///
/// ```rust
/// use parallel_mlp::{Activation, ArchitectureConfig, ParallelMlpBuilder};
///
/// # fn main() -> parallel_mlp::Result<()> {
/// let engine = ParallelMlpBuilder::new(4, 3)?
///     .architecture(ArchitectureConfig {
///         repetitions: 2,
///         activations: vec![Activation::ReLU, Activation::Tanh],
///         min_neurons: 1,
///         max_neurons: 5,
///         step: 2,
///     })
///     .build_with_seed(0)?;
/// assert_eq!(engine.num_models(), 3 * 2 * 2);
/// # Ok(())
/// # }
/// ```
pub struct ParallelMlpBuilder {
    in_features: usize,
    out_features: usize,
    architecture: ArchitectureConfig,
    bias: bool,
}

impl ParallelMlpBuilder {
    /// Start building an engine for `in_features` inputs and `out_features` outputs.
    pub fn new(in_features: usize, out_features: usize) -> Result<Self> {
        if in_features == 0 {
            return Err(Error::InvalidConfig("in_features must be > 0".to_owned()));
        }
        if out_features == 0 {
            return Err(Error::InvalidConfig("out_features must be > 0".to_owned()));
        }
        Ok(Self {
            in_features,
            out_features,
            architecture: ArchitectureConfig::default(),
            bias: true,
        })
    }

    /// Search space to pack. Defaults to [`ArchitectureConfig::default`].
    pub fn architecture(mut self, architecture: ArchitectureConfig) -> Self {
        self.architecture = architecture;
        self
    }

    /// Whether models get an output bias (default: `true`).
    pub fn bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// The engine configuration this builder would construct.
    pub fn config(&self) -> Result<ParallelMlpConfig> {
        let ids = build_model_ids(&self.architecture)?;
        Ok(ParallelMlpConfig::from_model_ids(
            self.in_features,
            self.out_features,
            ids,
            self.architecture.activations.clone(),
            self.bias,
        ))
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<ParallelMlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<ParallelMlp> {
        ParallelMlp::new_with_rng(self.config()?, rng)
    }
}
