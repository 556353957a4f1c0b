//! Training steps.
//!
//! A trainer owns the buffers one step needs (scratch, gradients, optimizer state) and
//! reuses them across calls. Epoch loops, shuffling and model selection are left to the
//! caller.

use log::trace;

use crate::confusion::ClassPredictions;
use crate::loss::validate_targets;
use crate::mlp::BatchScratch;
use crate::optim::Gradients;
use crate::parallel::ParallelScratch;
use crate::{
    Dataset, Error, Inputs, Loss, LossFn, Mlp, MultiConfusionMatrix, Optimizer, OptimizerState,
    ParallelMlp, Predictions, Result,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub lr: f32,
    pub optimizer: Optimizer,
    pub loss: Loss,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            optimizer: Optimizer::Sgd,
            loss: Loss::CrossEntropy,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {}",
                self.lr
            )));
        }
        self.optimizer.validate()
    }
}

/// Reusable training state for a [`ParallelMlp`].
#[derive(Debug, Clone)]
pub struct ParallelTrainer {
    cfg: TrainConfig,
    scratch: ParallelScratch,
    grads: Gradients,
    state: OptimizerState,
    d_predictions: Predictions,
    losses: Vec<f32>,
}

impl ParallelTrainer {
    pub fn new(model: &ParallelMlp, cfg: TrainConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            scratch: model.scratch(),
            grads: model.gradients(),
            state: cfg.optimizer.state(model)?,
            d_predictions: Predictions::zeros(0, model.num_models(), model.out_features()),
            losses: vec![0.0; model.num_models()],
        })
    }

    #[inline]
    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }

    /// Gradients of the last step, before the optimizer transformed them.
    ///
    /// Only meaningful for plain SGD, which leaves them unchanged.
    #[inline]
    pub fn gradients(&self) -> &Gradients {
        &self.grads
    }

    /// One step on a batch. Returns the mean loss of every model, shape `(num_models,)`.
    ///
    /// Every model is trained on the same batch and its own loss only.
    pub fn step(
        &mut self,
        model: &mut ParallelMlp,
        inputs: &Inputs,
        targets: &[usize],
    ) -> Result<&[f32]> {
        self.step_weighted(model, inputs, targets, None)
    }

    /// Like [`ParallelTrainer::step`], scaling each model's loss by `model_weights`
    /// (a weight of 0 freezes that model for this step under plain SGD).
    pub fn step_weighted(
        &mut self,
        model: &mut ParallelMlp,
        inputs: &Inputs,
        targets: &[usize],
        model_weights: Option<&[f32]>,
    ) -> Result<&[f32]> {
        if targets.len() != inputs.len() {
            return Err(Error::InvalidData(format!(
                "{} targets for {} inputs",
                targets.len(),
                inputs.len()
            )));
        }

        let batch = inputs.len();
        if self.d_predictions.batch_size() != batch {
            self.d_predictions = Predictions::zeros(batch, model.num_models(), model.out_features());
        }

        let loss_fn = LossFn::unreduced(self.cfg.loss);
        let predictions = model.forward_train(inputs, &mut self.scratch)?;
        model.loss_gradient_into(
            loss_fn,
            predictions,
            targets,
            model_weights,
            &mut self.d_predictions,
            &mut self.losses,
        )?;

        model.backward(&mut self.scratch, &self.d_predictions, &mut self.grads);
        self.state.step(model, &mut self.grads, self.cfg.lr);

        trace!("parallel step: batch {batch}, {} models", self.losses.len());
        Ok(self.losses.as_slice())
    }
}

/// Reusable training state for a standalone [`Mlp`].
#[derive(Debug, Clone)]
pub struct MlpTrainer {
    cfg: TrainConfig,
    scratch: BatchScratch,
    grads: Gradients,
    state: OptimizerState,
    d_output: Vec<f32>,
}

impl MlpTrainer {
    pub fn new(model: &Mlp, cfg: TrainConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            scratch: model.scratch(),
            grads: model.gradients(),
            state: cfg.optimizer.state(model)?,
            d_output: Vec::new(),
        })
    }

    /// One step on a batch. Returns the mean loss.
    pub fn step(&mut self, model: &mut Mlp, inputs: &Inputs, targets: &[usize]) -> Result<f32> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        if inputs.input_dim() != model.input_dim() {
            return Err(Error::InvalidData(format!(
                "inputs input_dim {} does not match model input_dim {}",
                inputs.input_dim(),
                model.input_dim()
            )));
        }
        if targets.len() != inputs.len() {
            return Err(Error::InvalidData(format!(
                "{} targets for {} inputs",
                targets.len(),
                inputs.len()
            )));
        }
        validate_targets(targets, model.output_dim())?;

        let batch = inputs.len();
        let out_dim = model.output_dim();
        let inv_batch = 1.0 / batch as f32;
        self.d_output.resize(batch * out_dim, 0.0);

        let outputs = model.forward_batch(inputs.as_slice(), batch, &mut self.scratch);
        let mut total = 0.0_f32;
        for ((row, d), &t) in outputs
            .chunks_exact(out_dim)
            .zip(self.d_output.chunks_exact_mut(out_dim))
            .zip(targets)
        {
            total += self.cfg.loss.backward(row, t, inv_batch, d);
        }

        model.backward_batch(
            inputs.as_slice(),
            &mut self.scratch,
            &self.d_output,
            &mut self.grads,
        );
        self.state.step(model, &mut self.grads, self.cfg.lr);

        Ok(total * inv_batch)
    }
}

impl ParallelMlp {
    /// Score every model on `data` into `cm`, one row of predictions per sample.
    ///
    /// `cm` must have one matrix per model and `out_features` classes.
    pub fn evaluate(&self, data: &Dataset, cm: &mut MultiConfusionMatrix) -> Result<()> {
        if data.num_classes() != self.out_features() {
            return Err(Error::InvalidData(format!(
                "dataset has {} classes, model has {} outputs",
                data.num_classes(),
                self.out_features()
            )));
        }
        let predictions = self.forward(data.inputs())?;
        cm.update(ClassPredictions::Scores(&predictions), data.labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, ArchitectureConfig, ParallelMlpBuilder};

    fn toy_data() -> Dataset {
        // label = x0 > x1
        let points = [
            [0.9_f32, 0.1],
            [0.2, 0.8],
            [0.7, -0.3],
            [-0.5, 0.4],
            [0.3, 0.0],
            [-0.2, 0.6],
            [1.0, 0.5],
            [0.1, 0.9],
        ];
        let labels = points.iter().map(|p| usize::from(p[0] > p[1])).collect();
        Dataset::from_flat(points.concat(), labels, 2, 2).unwrap()
    }

    fn engine() -> ParallelMlp {
        ParallelMlpBuilder::new(2, 2)
            .unwrap()
            .architecture(ArchitectureConfig {
                repetitions: 2,
                activations: vec![Activation::Tanh, Activation::Sigmoid],
                min_neurons: 2,
                max_neurons: 4,
                step: 2,
            })
            .build_with_seed(3)
            .unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(TrainConfig::default().validate().is_ok());
        let bad = TrainConfig {
            lr: 0.0,
            ..TrainConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn parallel_steps_reduce_mean_loss() {
        let data = toy_data();
        let mut model = engine();
        let mut trainer = ParallelTrainer::new(
            &model,
            TrainConfig {
                lr: 0.05,
                optimizer: Optimizer::ADAM,
                loss: Loss::CrossEntropy,
            },
        )
        .unwrap();

        let first = trainer
            .step(&mut model, data.inputs(), data.labels())
            .unwrap()
            .to_vec();
        assert_eq!(first.len(), model.num_models());
        let mut last = first.clone();
        for _ in 0..150 {
            last = trainer
                .step(&mut model, data.inputs(), data.labels())
                .unwrap()
                .to_vec();
        }
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        assert!(last.iter().all(|l| l.is_finite()));
        assert!(mean(&last) < mean(&first), "{first:?} -> {last:?}");
    }

    #[test]
    fn zero_weight_freezes_model_under_sgd() {
        let data = toy_data();
        let mut model = engine();
        let before = model.extract_mlp(1).unwrap();
        let mut trainer = ParallelTrainer::new(&model, TrainConfig::default()).unwrap();

        let mut weights = vec![1.0_f32; model.num_models()];
        weights[1] = 0.0;
        trainer
            .step_weighted(&mut model, data.inputs(), data.labels(), Some(&weights))
            .unwrap();

        assert_eq!(model.extract_mlp(1).unwrap(), before);
        assert_ne!(
            model.extract_mlp(0).unwrap(),
            engine().extract_mlp(0).unwrap()
        );
    }

    #[test]
    fn step_rejects_mismatched_targets() {
        let data = toy_data();
        let mut model = engine();
        let mut trainer = ParallelTrainer::new(&model, TrainConfig::default()).unwrap();
        assert!(
            trainer
                .step(&mut model, data.inputs(), &data.labels()[1..])
                .is_err()
        );
        assert!(
            trainer
                .step(&mut model, data.inputs(), &[2; 8])
                .is_err()
        );
    }

    #[test]
    fn mlp_trainer_reduces_loss() {
        let data = toy_data();
        let mut mlp = Mlp::new_with_seed(2, 4, 2, Activation::Tanh, 0).unwrap();
        let mut trainer = MlpTrainer::new(
            &mlp,
            TrainConfig {
                lr: 0.05,
                optimizer: Optimizer::ADAM,
                loss: Loss::CrossEntropy,
            },
        )
        .unwrap();

        let first = trainer.step(&mut mlp, data.inputs(), data.labels()).unwrap();
        let mut last = first;
        for _ in 0..150 {
            last = trainer.step(&mut mlp, data.inputs(), data.labels()).unwrap();
        }
        assert!(last < first, "{first} -> {last}");
    }

    #[test]
    fn evaluate_counts_every_sample_for_every_model() {
        let data = toy_data();
        let model = engine();
        let mut cm = MultiConfusionMatrix::new(model.num_models(), 2).unwrap();
        model.evaluate(&data, &mut cm).unwrap();
        assert_eq!(cm.total_samples(), data.len() as u64);
        for m in 0..model.num_models() {
            assert_eq!(
                cm.model_counts(m).unwrap().iter().sum::<u64>(),
                data.len() as u64
            );
        }
    }
}
