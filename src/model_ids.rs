//! Model-id assignment.
//!
//! An architecture search space is described by an [`ArchitectureConfig`]: a range of
//! hidden widths, a set of activation functions and a repetition count. Every
//! combination becomes one independent candidate model. [`build_model_ids`] lays those
//! models out in the shared hidden layer and returns the index arrays the engine
//! is built from.
//!
//! Layout: models are numbered in blocks of `S * K` (one block per repetition). Inside a
//! block the hidden width varies fastest. Each model owns a contiguous run of hidden
//! neurons, and runs appear in model-id order.

use crate::{Activation, Error, Result};

/// Search-space description for [`build_model_ids`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArchitectureConfig {
    /// How many independently initialized copies of every architecture to train.
    pub repetitions: usize,
    /// Distinct activation functions (by kind). Use `Identity` for "no activation".
    pub activations: Vec<Activation>,
    /// Smallest hidden width (inclusive).
    pub min_neurons: usize,
    /// Largest hidden width (inclusive upper bound of the sequence).
    pub max_neurons: usize,
    /// Distance between consecutive hidden widths.
    pub step: usize,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            repetitions: 1,
            activations: vec![Activation::ReLU],
            min_neurons: 1,
            max_neurons: 1,
            step: 1,
        }
    }
}

impl ArchitectureConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.activations.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one activation function must be passed; use Activation::Identity for no activation"
                    .to_owned(),
            ));
        }
        for (i, a) in self.activations.iter().enumerate() {
            a.validate()?;
            if self.activations[..i].iter().any(|b| b.same_kind(*a)) {
                return Err(Error::InvalidConfig(format!(
                    "activations must have only unique values, `{}` appears more than once",
                    a.name()
                )));
            }
        }
        if self.repetitions == 0 {
            return Err(Error::InvalidConfig("repetitions must be > 0".to_owned()));
        }
        if self.step == 0 {
            return Err(Error::InvalidConfig("step must be > 0".to_owned()));
        }
        if self.min_neurons == 0 {
            return Err(Error::InvalidConfig("min_neurons must be > 0".to_owned()));
        }
        if self.min_neurons > self.max_neurons {
            return Err(Error::InvalidConfig(format!(
                "min_neurons {} must be <= max_neurons {}",
                self.min_neurons, self.max_neurons
            )));
        }
        Ok(())
    }

    /// Hidden widths `min, min + step, ... <= max`.
    pub fn neuron_structures(&self) -> Vec<usize> {
        (self.min_neurons..=self.max_neurons)
            .step_by(self.step.max(1))
            .collect()
    }

    /// Number of distinct architectures (`S * K`), ignoring repetitions.
    pub fn num_architectures(&self) -> usize {
        self.neuron_structures().len() * self.activations.len()
    }

    /// Total number of candidate models (`S * K * R`).
    pub fn num_models(&self) -> usize {
        self.num_architectures() * self.repetitions
    }
}

/// Index arrays relating hidden neurons and outputs to models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIds {
    /// For each hidden neuron, the model that owns it.
    pub hidden_neuron_model_id: Vec<usize>,
    /// Model id of every output slot, in increasing order.
    pub output_model_id: Vec<usize>,
    /// Architecture id of every output slot. It keys the hidden width and the slot
    /// position within a repetition, not the activation: with more than one repetition
    /// two models may share an id yet use different activations. The activation a model
    /// actually uses is reported by [`crate::ParallelMlp::model_activation`].
    pub output_architecture_id: Vec<usize>,
}

impl ModelIds {
    #[inline]
    pub fn num_models(&self) -> usize {
        self.output_model_id.len()
    }

    #[inline]
    pub fn total_hidden_neurons(&self) -> usize {
        self.hidden_neuron_model_id.len()
    }
}

/// Build the model-id arrays for a search space.
///
/// Fails with [`Error::InvalidConfig`] if the activation list is empty or holds the
/// same kind twice, before anything is allocated.
pub fn build_model_ids(cfg: &ArchitectureConfig) -> Result<ModelIds> {
    cfg.validate()?;

    let structures = cfg.neuron_structures();
    let num_architectures = structures.len() * cfg.activations.len();
    let num_models = num_architectures * cfg.repetitions;

    let total: usize = (0..num_models).map(|m| structures[m % structures.len()]).sum();
    let mut hidden_neuron_model_id = Vec::with_capacity(total);
    for model_id in 0..num_models {
        let width = structures[model_id % structures.len()];
        hidden_neuron_model_id.extend(std::iter::repeat_n(model_id, width));
    }

    let output_model_id = run_heads(&hidden_neuron_model_id);
    let output_architecture_id = output_model_id[..num_architectures]
        .iter()
        .copied()
        .cycle()
        .take(num_architectures * cfg.repetitions)
        .collect();

    Ok(ModelIds {
        hidden_neuron_model_id,
        output_model_id,
        output_architecture_id,
    })
}

/// First element of every run of equal consecutive values.
fn run_heads(ids: &[usize]) -> Vec<usize> {
    let mut heads: Vec<usize> = Vec::new();
    for &id in ids {
        if heads.last() != Some(&id) {
            heads.push(id);
        }
    }
    heads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(
        activations: Vec<Activation>,
        repetitions: usize,
        min_neurons: usize,
        max_neurons: usize,
        step: usize,
    ) -> ArchitectureConfig {
        ArchitectureConfig {
            repetitions,
            activations,
            min_neurons,
            max_neurons,
            step,
        }
    }

    #[rustfmt::skip]
    #[test]
    fn hidden_neuron_ids_match_known_layouts() {
        let relu_sig = vec![Activation::ReLU, Activation::Sigmoid];
        let cases: Vec<(ArchitectureConfig, Vec<usize>)> = vec![
            (
                cfg(relu_sig.clone(), 3, 1, 3, 1),
                vec![0, 1, 1, 2, 2, 2, 3, 4, 4, 5, 5, 5, 6, 7, 7, 8, 8, 8, 9, 10, 10, 11, 11, 11, 12, 13, 13, 14, 14, 14, 15, 16, 16, 17, 17, 17],
            ),
            (
                cfg(relu_sig.clone(), 3, 1, 3, 2),
                vec![0, 1, 1, 1, 2, 3, 3, 3, 4, 5, 5, 5, 6, 7, 7, 7, 8, 9, 9, 9, 10, 11, 11, 11],
            ),
            (
                cfg(relu_sig.clone(), 3, 3, 3, 1),
                vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5],
            ),
            (
                cfg(relu_sig, 3, 2, 4, 2),
                vec![0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 5, 5, 6, 6, 7, 7, 7, 7, 8, 8, 9, 9, 9, 9, 10, 10, 11, 11, 11, 11],
            ),
            (
                cfg(vec![Activation::ReLU, Activation::Tanh, Activation::Sigmoid], 2, 2, 4, 2),
                vec![0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 5, 5, 6, 6, 7, 7, 7, 7, 8, 8, 9, 9, 9, 9, 10, 10, 11, 11, 11, 11],
            ),
        ];

        for (cfg, expected) in cases {
            let ids = build_model_ids(&cfg).unwrap();
            assert_eq!(ids.hidden_neuron_model_id, expected, "config {cfg:?}");
        }
    }

    #[test]
    fn output_ids_and_architecture_ids() {
        let ids = build_model_ids(&cfg(vec![Activation::ReLU, Activation::Sigmoid], 3, 1, 3, 1))
            .unwrap();
        assert_eq!(ids.output_model_id, (0..18).collect::<Vec<_>>());

        let expected_arch: Vec<usize> = (0..6).cycle().take(18).collect();
        assert_eq!(ids.output_architecture_id, expected_arch);
        assert_eq!(ids.num_models(), 18);
        assert_eq!(ids.total_hidden_neurons(), 36);
    }

    #[test]
    fn assignment_is_deterministic() {
        let c = cfg(vec![Activation::Tanh, Activation::Identity], 4, 2, 9, 3);
        assert_eq!(build_model_ids(&c).unwrap(), build_model_ids(&c).unwrap());
    }

    #[test]
    fn every_model_owns_a_contiguous_run_of_its_width() {
        let c = cfg(
            vec![Activation::ReLU, Activation::Tanh, Activation::Sigmoid],
            2,
            3,
            10,
            3,
        );
        let structures = c.neuron_structures();
        assert_eq!(structures, vec![3, 6, 9]);

        let ids = build_model_ids(&c).unwrap();
        let mut pos = 0;
        for m in 0..c.num_models() {
            let width = structures[m % structures.len()];
            assert!(
                ids.hidden_neuron_model_id[pos..pos + width]
                    .iter()
                    .all(|&id| id == m)
            );
            pos += width;
        }
        assert_eq!(pos, ids.total_hidden_neurons());
    }

    #[test]
    fn rejects_empty_activation_list() {
        let err = build_model_ids(&cfg(vec![], 2, 1, 3, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(format!("{err}").contains("Identity"));
    }

    #[test]
    fn rejects_duplicate_activation_kinds() {
        let err = build_model_ids(&cfg(
            vec![Activation::ReLU, Activation::Sigmoid, Activation::Sigmoid],
            2,
            1,
            3,
            1,
        ))
        .unwrap_err();
        assert!(format!("{err}").contains("only unique values"));

        let leaky = build_model_ids(&cfg(
            vec![
                Activation::LeakyReLU { alpha: 0.01 },
                Activation::LeakyReLU { alpha: 0.2 },
            ],
            1,
            1,
            3,
            1,
        ));
        assert!(matches!(leaky, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_degenerate_ranges() {
        let acts = vec![Activation::ReLU];
        assert!(build_model_ids(&cfg(acts.clone(), 0, 1, 3, 1)).is_err());
        assert!(build_model_ids(&cfg(acts.clone(), 1, 1, 3, 0)).is_err());
        assert!(build_model_ids(&cfg(acts.clone(), 1, 0, 3, 1)).is_err());
        assert!(build_model_ids(&cfg(acts, 1, 4, 3, 1)).is_err());
    }
}
