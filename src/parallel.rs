//! Parallel MLP engine.
//!
//! [`ParallelMlp`] packs many independent single-hidden-layer networks into one set of
//! dense buffers:
//!
//! - hidden weight `(total_hidden_neurons, in_features)`, hidden bias `(total_hidden_neurons,)`:
//!   rows `start(m)..end(m)` belong to model `m`
//! - output weight `(out_features, total_hidden_neurons)`: columns `start(m)..end(m)` belong
//!   to model `m`
//! - output bias `(num_models, out_features)` (optional): row `m` belongs to model `m`
//!
//! The hidden layer is one affine map over all models. It is split into `K` equal,
//! contiguous segments and segment `k` uses `activations[k]`. Hidden contributions are
//! then reduced into each owning model's output head.
//!
//! Every model can be extracted into a standalone [`Mlp`] whose outputs match the engine's
//! outputs for that model.

use std::fmt;
use std::ops::Range;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layer::{bias_bound, fill_uniform};
use crate::loss::validate_targets;
use crate::matmul::{column_sums, linear_forward, linear_weight_grad};
use crate::optim::{Gradients, Parameters};
use crate::{
    Activation, Error, Init, Inputs, Layer, LossFn, Mlp, ModelIds, Predictions, Reduction, Result,
};

/// Construction parameters of a [`ParallelMlp`].
///
/// The id arrays normally come from [`crate::build_model_ids`]; see
/// [`ParallelMlpConfig::from_model_ids`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelMlpConfig {
    pub in_features: usize,
    pub out_features: usize,
    /// Owning model of every hidden neuron. Must start at 0 and be contiguous and
    /// non-decreasing.
    pub hidden_neuron_model_id: Vec<usize>,
    pub output_model_id: Vec<usize>,
    pub output_architecture_id: Vec<usize>,
    /// One activation per equal hidden segment.
    pub activations: Vec<Activation>,
    /// Whether each model has an output bias.
    pub bias: bool,
}

impl ParallelMlpConfig {
    pub fn from_model_ids(
        in_features: usize,
        out_features: usize,
        ids: ModelIds,
        activations: Vec<Activation>,
        bias: bool,
    ) -> Self {
        Self {
            in_features,
            out_features,
            hidden_neuron_model_id: ids.hidden_neuron_model_id,
            output_model_id: ids.output_model_id,
            output_architecture_id: ids.output_architecture_id,
            activations,
            bias,
        }
    }
}

/// Reusable buffers for [`ParallelMlp::forward_train`] / [`ParallelMlp::backward`].
#[derive(Debug, Clone)]
pub struct ParallelScratch {
    batch: usize,
    inputs: Vec<f32>,
    hidden: Vec<f32>,
    d_hidden: Vec<f32>,
    predictions: Predictions,
}

impl ParallelScratch {
    /// Predictions of the last `forward_train`.
    #[inline]
    pub fn predictions(&self) -> &Predictions {
        &self.predictions
    }

    /// Post-activation hidden values of the last `forward_train`,
    /// shape `(batch, total_hidden_neurons)`.
    #[inline]
    pub fn hidden(&self) -> &[f32] {
        &self.hidden
    }
}

/// Many independent MLPs trained in a single batched computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelMlp {
    in_features: usize,
    out_features: usize,
    hidden_neuron_model_id: Vec<usize>,
    output_model_id: Vec<usize>,
    output_architecture_id: Vec<usize>,
    activations: Vec<Activation>,

    num_neurons: Vec<usize>,
    starts: Vec<usize>,
    unique_model_ids: Vec<usize>,
    activations_split: usize,

    hidden_weight: Vec<f32>,
    hidden_bias: Vec<f32>,
    output_weight: Vec<f32>,
    output_bias: Option<Vec<f32>>,
}

impl ParallelMlp {
    pub fn new_with_seed(cfg: ParallelMlpConfig, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(cfg, &mut rng)
    }

    /// Validate `cfg`, allocate all parameter buffers and initialize every model.
    pub fn new_with_rng<R: Rng + ?Sized>(cfg: ParallelMlpConfig, rng: &mut R) -> Result<Self> {
        let ParallelMlpConfig {
            in_features,
            out_features,
            hidden_neuron_model_id,
            output_model_id,
            output_architecture_id,
            activations,
            bias,
        } = cfg;

        if in_features == 0 || out_features == 0 {
            return Err(Error::InvalidConfig(format!(
                "in_features and out_features must be > 0, got {in_features} and {out_features}"
            )));
        }
        if activations.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one activation function is required".to_owned(),
            ));
        }
        for a in &activations {
            a.validate()?;
        }

        let num_neurons = neuron_counts(&hidden_neuron_model_id)?;
        let num_models = num_neurons.len();
        if output_model_id.len() != num_models
            || output_model_id.iter().enumerate().any(|(i, &m)| i != m)
        {
            return Err(Error::InvalidShape(format!(
                "output_model_id must be [0, {num_models}), got {} entries",
                output_model_id.len()
            )));
        }
        if output_architecture_id.len() != num_models {
            return Err(Error::InvalidShape(format!(
                "output_architecture_id length {} does not match num_models {num_models}",
                output_architecture_id.len()
            )));
        }

        let total = hidden_neuron_model_id.len();
        let k = activations.len();
        if !total.is_multiple_of(k) {
            return Err(Error::InvalidShape(format!(
                "total_hidden_neurons {total} is not divisible by the number of activations {k}"
            )));
        }
        let activations_split = total / k;

        let mut starts = Vec::with_capacity(num_models);
        let mut offset = 0;
        for (m, &n) in num_neurons.iter().enumerate() {
            if offset / activations_split != (offset + n - 1) / activations_split {
                return Err(Error::InvalidShape(format!(
                    "model {m} (neurons {offset}..{}) spans more than one activation segment",
                    offset + n
                )));
            }
            starts.push(offset);
            offset += n;
        }

        let mut mlp = Self {
            in_features,
            out_features,
            hidden_neuron_model_id,
            output_model_id,
            output_architecture_id,
            activations,
            unique_model_ids: (0..num_models).collect(),
            num_neurons,
            starts,
            activations_split,
            hidden_weight: vec![0.0; total * in_features],
            hidden_bias: vec![0.0; total],
            output_weight: vec![0.0; out_features * total],
            output_bias: bias.then(|| vec![0.0; num_models * out_features]),
        };
        mlp.reset_parameters(None, rng)?;

        info!(
            "parallel mlp: {num_models} models, {total} hidden neurons, {k} activation segments of {activations_split}"
        );
        Ok(mlp)
    }

    #[inline]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    #[inline]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    #[inline]
    pub fn bias(&self) -> bool {
        self.output_bias.is_some()
    }

    #[inline]
    pub fn num_models(&self) -> usize {
        self.num_neurons.len()
    }

    #[inline]
    pub fn num_activations(&self) -> usize {
        self.activations.len()
    }

    #[inline]
    pub fn total_hidden_neurons(&self) -> usize {
        self.hidden_neuron_model_id.len()
    }

    /// Width of one activation segment.
    #[inline]
    pub fn activations_split(&self) -> usize {
        self.activations_split
    }

    #[inline]
    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    #[inline]
    pub fn unique_model_ids(&self) -> &[usize] {
        &self.unique_model_ids
    }

    #[inline]
    pub fn hidden_neuron_model_id(&self) -> &[usize] {
        &self.hidden_neuron_model_id
    }

    #[inline]
    pub fn output_model_id(&self) -> &[usize] {
        &self.output_model_id
    }

    #[inline]
    pub fn output_architecture_id(&self) -> &[usize] {
        &self.output_architecture_id
    }

    #[inline]
    pub fn hidden_weight(&self) -> &[f32] {
        &self.hidden_weight
    }

    #[inline]
    pub fn hidden_bias(&self) -> &[f32] {
        &self.hidden_bias
    }

    #[inline]
    pub fn output_weight(&self) -> &[f32] {
        &self.output_weight
    }

    #[inline]
    pub fn output_bias(&self) -> Option<&[f32]> {
        self.output_bias.as_deref()
    }

    fn check_model_id(&self, model_id: usize) -> Result<()> {
        if model_id >= self.num_models() {
            return Err(Error::InvalidModelId {
                model_id,
                num_models: self.num_models(),
            });
        }
        Ok(())
    }

    #[inline]
    fn range(&self, model_id: usize) -> Range<usize> {
        let start = self.starts[model_id];
        start..start + self.num_neurons[model_id]
    }

    pub fn model_num_neurons(&self, model_id: usize) -> Result<usize> {
        self.check_model_id(model_id)?;
        Ok(self.num_neurons[model_id])
    }

    /// Hidden neurons owned by `model_id`.
    pub fn model_range(&self, model_id: usize) -> Result<Range<usize>> {
        self.check_model_id(model_id)?;
        Ok(self.range(model_id))
    }

    /// Activation of the segment holding `model_id`'s neurons.
    pub fn model_activation(&self, model_id: usize) -> Result<Activation> {
        self.check_model_id(model_id)?;
        Ok(self.activations[self.starts[model_id] / self.activations_split])
    }

    pub fn architecture_id(&self, model_id: usize) -> Result<usize> {
        self.check_model_id(model_id)?;
        Ok(self.output_architecture_id[model_id])
    }

    /// Re-draw the parameters of the given models (all models when `None`).
    ///
    /// Weights use [`Init::default`], biases `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`. Fan-in
    /// is `in_features` for a model's hidden rows and its hidden width for its output
    /// columns and output bias. Other models are left untouched. Unknown ids fail before
    /// anything is written.
    pub fn reset_parameters<R: Rng + ?Sized>(
        &mut self,
        model_ids: Option<&[usize]>,
        rng: &mut R,
    ) -> Result<()> {
        let ids: Vec<usize> = match model_ids {
            Some(ids) => {
                for &m in ids {
                    self.check_model_id(m)?;
                }
                ids.to_vec()
            }
            None => self.unique_model_ids.clone(),
        };

        let init = Init::default();
        let (in_f, out_f) = (self.in_features, self.out_features);
        let total = self.total_hidden_neurons();

        for &m in &ids {
            let range = self.range(m);
            let width = range.len();

            init.fill_weights(
                self.hidden_weight[range.start * in_f..range.end * in_f].iter_mut(),
                in_f,
                rng,
            );
            fill_uniform(
                self.hidden_bias[range.clone()].iter_mut(),
                bias_bound(in_f),
                rng,
            );
            init.fill_weights(
                self.output_weight
                    .chunks_exact_mut(total)
                    .flat_map(|row| row[range.clone()].iter_mut()),
                width,
                rng,
            );
            if let Some(ob) = self.output_bias.as_mut() {
                fill_uniform(
                    ob[m * out_f..(m + 1) * out_f].iter_mut(),
                    bias_bound(width),
                    rng,
                );
            }
        }

        debug!("reset parameters of {} models", ids.len());
        Ok(())
    }

    fn check_inputs(&self, inputs: &Inputs) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        if inputs.input_dim() != self.in_features {
            return Err(Error::InvalidShape(format!(
                "inputs input_dim {} does not match in_features {}",
                inputs.input_dim(),
                self.in_features
            )));
        }
        Ok(())
    }

    /// Forward pass of every model, shape `(batch, num_models, out_features)`.
    pub fn forward(&self, inputs: &Inputs) -> Result<Predictions> {
        self.check_inputs(inputs)?;

        let batch = inputs.len();
        let mut hidden = vec![0.0; batch * self.total_hidden_neurons()];
        let mut predictions = Predictions::zeros(batch, self.num_models(), self.out_features);
        self.forward_into(
            inputs.as_slice(),
            batch,
            &mut hidden,
            predictions.as_mut_slice(),
        );
        Ok(predictions)
    }

    /// Forward pass that keeps what [`ParallelMlp::backward`] needs in `scratch`.
    pub fn forward_train<'a>(
        &self,
        inputs: &Inputs,
        scratch: &'a mut ParallelScratch,
    ) -> Result<&'a Predictions> {
        self.check_inputs(inputs)?;

        let batch = inputs.len();
        let total = self.total_hidden_neurons();
        scratch.batch = batch;
        scratch.inputs.clear();
        scratch.inputs.extend_from_slice(inputs.as_slice());
        scratch.hidden.resize(batch * total, 0.0);
        scratch.d_hidden.resize(batch * total, 0.0);
        if scratch.predictions.batch_size() != batch
            || scratch.predictions.num_models() != self.num_models()
            || scratch.predictions.out_features() != self.out_features
        {
            scratch.predictions = Predictions::zeros(batch, self.num_models(), self.out_features);
        }

        self.forward_into(
            &scratch.inputs,
            batch,
            &mut scratch.hidden,
            scratch.predictions.as_mut_slice(),
        );
        Ok(&scratch.predictions)
    }

    pub fn scratch(&self) -> ParallelScratch {
        ParallelScratch {
            batch: 0,
            inputs: Vec::new(),
            hidden: Vec::new(),
            d_hidden: Vec::new(),
            predictions: Predictions::zeros(0, self.num_models(), self.out_features),
        }
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::zeros_like(self)
    }

    fn forward_into(&self, inputs: &[f32], batch: usize, hidden: &mut [f32], outputs: &mut [f32]) {
        let total = self.total_hidden_neurons();
        let (num_models, out_f) = (self.num_models(), self.out_features);

        linear_forward(
            inputs,
            batch,
            self.in_features,
            &self.hidden_weight,
            &self.hidden_bias,
            total,
            hidden,
        );
        for row in hidden.chunks_exact_mut(total) {
            for (segment, act) in row
                .chunks_exact_mut(self.activations_split)
                .zip(&self.activations)
            {
                act.apply(segment);
            }
        }

        // Ranges are contiguous, so scattering by owner reduces to a sum per model range.
        for (h_row, out_row) in hidden
            .chunks_exact(total)
            .zip(outputs.chunks_exact_mut(num_models * out_f))
        {
            for m in 0..num_models {
                let range = self.range(m);
                let out = &mut out_row[m * out_f..(m + 1) * out_f];
                for (o, y) in out.iter_mut().enumerate() {
                    let w_row = &self.output_weight[o * total..(o + 1) * total];
                    let mut acc = 0.0_f32;
                    for j in range.clone() {
                        acc = h_row[j].mul_add(w_row[j], acc);
                    }
                    *y = acc;
                }
                if let Some(ob) = &self.output_bias {
                    for (y, &b) in out.iter_mut().zip(&ob[m * out_f..(m + 1) * out_f]) {
                        *y += b;
                    }
                }
            }
        }
    }

    fn check_predictions(&self, predictions: &Predictions, targets: &[usize]) -> Result<()> {
        if predictions.num_models() != self.num_models()
            || predictions.out_features() != self.out_features
        {
            return Err(Error::InvalidShape(format!(
                "predictions have {} models x {} outputs, expected {} x {}",
                predictions.num_models(),
                predictions.out_features(),
                self.num_models(),
                self.out_features
            )));
        }
        if predictions.batch_size() == 0 || predictions.batch_size() != targets.len() {
            return Err(Error::InvalidShape(format!(
                "predictions batch {} does not match {} targets",
                predictions.batch_size(),
                targets.len()
            )));
        }
        validate_targets(targets, self.out_features)
    }

    /// Per-sample, per-model loss, shape `(batch, num_models)`.
    ///
    /// Every model's outputs are scored against the shared targets. `loss_fn` must be
    /// unreduced.
    pub fn calculate_loss(
        &self,
        loss_fn: LossFn,
        predictions: &Predictions,
        targets: &[usize],
    ) -> Result<Vec<f32>> {
        require_unreduced(loss_fn)?;
        self.check_predictions(predictions, targets)?;

        let num_models = self.num_models();
        let mut losses = Vec::with_capacity(targets.len() * num_models);
        for (b, &t) in targets.iter().enumerate() {
            for m in 0..num_models {
                losses.push(loss_fn.loss.forward(predictions.row(b, m), t));
            }
        }
        Ok(losses)
    }

    /// Per-sample loss for outputs without a model axis, shape `(batch,)`.
    ///
    /// `outputs` is `(batch, out_features)`, e.g. from an extracted model.
    pub fn calculate_sample_loss(
        &self,
        loss_fn: LossFn,
        outputs: &[f32],
        targets: &[usize],
    ) -> Result<Vec<f32>> {
        require_unreduced(loss_fn)?;
        if targets.is_empty() || outputs.len() != targets.len() * self.out_features {
            return Err(Error::InvalidShape(format!(
                "outputs length {} does not match {} targets x {} outputs",
                outputs.len(),
                targets.len(),
                self.out_features
            )));
        }
        validate_targets(targets, self.out_features)?;

        Ok(outputs
            .chunks_exact(self.out_features)
            .zip(targets)
            .map(|(row, &t)| loss_fn.loss.forward(row, t))
            .collect())
    }

    /// Per-model mean loss, shape `(num_models,)`, and the gradient of
    /// `sum_m w_m * mean_b loss[b, m]` w.r.t. `predictions`.
    ///
    /// `model_weights` defaults to all ones.
    pub fn loss_gradient(
        &self,
        loss_fn: LossFn,
        predictions: &Predictions,
        targets: &[usize],
        model_weights: Option<&[f32]>,
    ) -> Result<(Vec<f32>, Predictions)> {
        let mut model_losses = vec![0.0_f32; self.num_models()];
        let mut d_predictions = Predictions::zeros(
            predictions.batch_size(),
            predictions.num_models(),
            predictions.out_features(),
        );
        self.loss_gradient_into(
            loss_fn,
            predictions,
            targets,
            model_weights,
            &mut d_predictions,
            &mut model_losses,
        )?;
        Ok((model_losses, d_predictions))
    }

    /// Like [`ParallelMlp::loss_gradient`], writing into caller-owned buffers.
    ///
    /// `d_predictions` must have the shape of `predictions` and `model_losses` one
    /// entry per model. Both are overwritten.
    pub fn loss_gradient_into(
        &self,
        loss_fn: LossFn,
        predictions: &Predictions,
        targets: &[usize],
        model_weights: Option<&[f32]>,
        d_predictions: &mut Predictions,
        model_losses: &mut [f32],
    ) -> Result<()> {
        require_unreduced(loss_fn)?;
        self.check_predictions(predictions, targets)?;

        let num_models = self.num_models();
        if let Some(w) = model_weights {
            if w.len() != num_models {
                return Err(Error::InvalidShape(format!(
                    "model_weights length {} does not match num_models {num_models}",
                    w.len()
                )));
            }
            if w.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidData(
                    "model_weights must be finite".to_owned(),
                ));
            }
        }
        if model_losses.len() != num_models {
            return Err(Error::InvalidShape(format!(
                "model_losses length {} does not match num_models {num_models}",
                model_losses.len()
            )));
        }
        if (
            d_predictions.batch_size(),
            d_predictions.num_models(),
            d_predictions.out_features(),
        ) != (
            predictions.batch_size(),
            predictions.num_models(),
            predictions.out_features(),
        ) {
            return Err(Error::InvalidShape(format!(
                "d_predictions shape ({}, {}, {}) does not match predictions ({}, {}, {})",
                d_predictions.batch_size(),
                d_predictions.num_models(),
                d_predictions.out_features(),
                predictions.batch_size(),
                predictions.num_models(),
                predictions.out_features()
            )));
        }

        let inv_batch = 1.0 / targets.len() as f32;
        model_losses.fill(0.0);
        for (b, &t) in targets.iter().enumerate() {
            for (m, total) in model_losses.iter_mut().enumerate() {
                let weight = model_weights.map_or(1.0, |w| w[m]);
                *total += loss_fn.loss.backward(
                    predictions.row(b, m),
                    t,
                    weight * inv_batch,
                    d_predictions.row_mut(b, m),
                );
            }
        }
        for l in model_losses.iter_mut() {
            *l *= inv_batch;
        }

        Ok(())
    }

    /// Backward pass for the most recent [`ParallelMlp::forward_train`] on `scratch`.
    ///
    /// `d_predictions` is `dL/d(predictions)`. `grads` is overwritten.
    ///
    /// Panics if `scratch`, `d_predictions` or `grads` do not match this engine.
    pub fn backward(
        &self,
        scratch: &mut ParallelScratch,
        d_predictions: &Predictions,
        grads: &mut Gradients,
    ) {
        let batch = scratch.batch;
        let total = self.total_hidden_neurons();
        let (num_models, out_f) = (self.num_models(), self.out_features);
        assert!(batch > 0, "backward called before forward_train");
        assert_eq!(
            (
                d_predictions.batch_size(),
                d_predictions.num_models(),
                d_predictions.out_features()
            ),
            (batch, num_models, out_f),
            "d_predictions shape mismatch"
        );
        assert_eq!(
            grads.num_groups(),
            if self.bias() { 4 } else { 3 },
            "grads must be built for this engine"
        );

        let ParallelScratch {
            inputs,
            hidden,
            d_hidden,
            ..
        } = scratch;
        let d_out = d_predictions.as_slice();

        if self.output_bias.is_some() {
            column_sums(d_out, num_models * out_f, grads.group_mut(3));
        }

        let d_w_out = grads.group_mut(2);
        d_w_out.fill(0.0);
        for (h_row, d_row) in hidden
            .chunks_exact(total)
            .zip(d_out.chunks_exact(num_models * out_f))
        {
            for (o, g_row) in d_w_out.chunks_exact_mut(total).enumerate() {
                for m in 0..num_models {
                    let d = d_row[m * out_f + o];
                    for j in self.range(m) {
                        g_row[j] = d.mul_add(h_row[j], g_row[j]);
                    }
                }
            }
        }

        for ((dh_row, h_row), d_row) in d_hidden
            .chunks_exact_mut(total)
            .zip(hidden.chunks_exact(total))
            .zip(d_out.chunks_exact(num_models * out_f))
        {
            for m in 0..num_models {
                let d_model = &d_row[m * out_f..(m + 1) * out_f];
                for j in self.range(m) {
                    let mut acc = 0.0_f32;
                    for (o, &d) in d_model.iter().enumerate() {
                        acc = d.mul_add(self.output_weight[o * total + j], acc);
                    }
                    dh_row[j] = acc;
                }
            }
            for ((dh, h), act) in dh_row
                .chunks_exact_mut(self.activations_split)
                .zip(h_row.chunks_exact(self.activations_split))
                .zip(&self.activations)
            {
                for (d, &y) in dh.iter_mut().zip(h) {
                    *d *= act.grad_from_output(y);
                }
            }
        }

        linear_weight_grad(
            d_hidden,
            inputs,
            batch,
            self.in_features,
            total,
            grads.group_mut(0),
        );
        column_sums(d_hidden, total, grads.group_mut(1));
    }

    /// Copy model `model_id` out into a standalone [`Mlp`].
    ///
    /// The copy shares nothing with the engine.
    pub fn extract_mlp(&self, model_id: usize) -> Result<Mlp> {
        self.check_model_id(model_id)?;

        let range = self.range(model_id);
        let width = range.len();
        let (in_f, out_f) = (self.in_features, self.out_features);
        let total = self.total_hidden_neurons();
        let activation = self.activations[range.start / self.activations_split];

        let hidden = Layer::from_parts_unchecked_values(
            in_f,
            width,
            self.hidden_weight[range.start * in_f..range.end * in_f].to_vec(),
            self.hidden_bias[range.clone()].to_vec(),
        )?;

        let mut out_weights = Vec::with_capacity(out_f * width);
        for row in self.output_weight.chunks_exact(total) {
            out_weights.extend_from_slice(&row[range.clone()]);
        }
        let out_biases = match &self.output_bias {
            Some(ob) => ob[model_id * out_f..(model_id + 1) * out_f].to_vec(),
            None => vec![0.0; out_f],
        };
        let output = Layer::from_parts_unchecked_values(width, out_f, out_weights, out_biases)?;

        debug!("extracted model {model_id}: {width} hidden neurons, {activation}");
        Mlp::from_layers(hidden, activation, output)
    }
}

impl Parameters for ParallelMlp {
    /// Hidden weight, hidden bias, output weight and, with bias, output bias.
    fn num_param_groups(&self) -> usize {
        3 + usize::from(self.output_bias.is_some())
    }

    fn param_group(&self, idx: usize) -> &[f32] {
        match (idx, &self.output_bias) {
            (0, _) => &self.hidden_weight,
            (1, _) => &self.hidden_bias,
            (2, _) => &self.output_weight,
            (3, Some(ob)) => ob,
            _ => panic!(
                "parameter group {idx} out of range for {} groups",
                self.num_param_groups()
            ),
        }
    }

    fn param_group_mut(&mut self, idx: usize) -> &mut [f32] {
        let num_groups = self.num_param_groups();
        match (idx, &mut self.output_bias) {
            (0, _) => &mut self.hidden_weight,
            (1, _) => &mut self.hidden_bias,
            (2, _) => &mut self.output_weight,
            (3, Some(ob)) => ob,
            _ => panic!("parameter group {idx} out of range for {num_groups} groups"),
        }
    }
}

impl fmt::Display for ParallelMlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ParallelMlp(in_features={}, out_features={}, bias={})",
            self.in_features,
            self.out_features,
            self.bias()
        )
    }
}

fn require_unreduced(loss_fn: LossFn) -> Result<()> {
    if loss_fn.reduction != Reduction::None {
        return Err(Error::InvalidConfig(format!(
            "loss must be unreduced to score each model separately, got {:?}",
            loss_fn.reduction
        )));
    }
    Ok(())
}

/// Per-model neuron counts of a contiguous, non-decreasing id array starting at 0.
fn neuron_counts(hidden_neuron_model_id: &[usize]) -> Result<Vec<usize>> {
    let Some(&first) = hidden_neuron_model_id.first() else {
        return Err(Error::InvalidShape(
            "hidden_neuron_model_id must not be empty".to_owned(),
        ));
    };
    if first != 0 {
        return Err(Error::InvalidShape(format!(
            "hidden_neuron_model_id must start at 0, got {first}"
        )));
    }

    let mut counts = vec![1_usize];
    for (j, pair) in hidden_neuron_model_id.windows(2).enumerate() {
        match pair[1].checked_sub(pair[0]) {
            Some(0) => {
                if let Some(count) = counts.last_mut() {
                    *count += 1;
                }
            }
            Some(1) => counts.push(1),
            _ => {
                return Err(Error::InvalidShape(format!(
                    "hidden_neuron_model_id must be contiguous and non-decreasing, got {} after {} at neuron {}",
                    pair[1],
                    pair[0],
                    j + 1
                )));
            }
        }
    }
    Ok(counts)
}
