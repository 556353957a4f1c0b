//! Standalone single-hidden-layer network.
//!
//! This is what [`crate::ParallelMlp::extract_mlp`] returns: `hidden affine ->
//! activation -> output affine`, owning copies of its parameters. It can be trained on
//! its own with the same optimizers as the engine, or exported (feature `serde`).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::matmul::{column_sums, linear_input_grad, linear_weight_grad};
use crate::optim::{Gradients, Parameters};
use crate::{Activation, Error, Init, Inputs, Layer, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    hidden: Layer,
    activation: Activation,
    output: Layer,
}

/// Reusable buffers for batched forward/backward passes of an [`Mlp`].
///
/// The output of the most recent forward pass lives inside the scratch.
#[derive(Debug, Clone)]
pub struct BatchScratch {
    batch: usize,
    hidden: Vec<f32>,
    output: Vec<f32>,
    d_hidden: Vec<f32>,
}

impl BatchScratch {
    fn prepare(&mut self, batch: usize, hidden_dim: usize, output_dim: usize) {
        self.batch = batch;
        self.hidden.resize(batch * hidden_dim, 0.0);
        self.output.resize(batch * output_dim, 0.0);
        self.d_hidden.resize(batch * hidden_dim, 0.0);
    }

    /// Outputs of the last forward pass, shape `(batch, output_dim)`.
    #[inline]
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Post-activation hidden values of the last forward pass.
    #[inline]
    pub fn hidden(&self) -> &[f32] {
        &self.hidden
    }
}

impl Mlp {
    /// Assemble a network from its two layers.
    pub fn from_layers(hidden: Layer, activation: Activation, output: Layer) -> Result<Self> {
        activation.validate()?;
        if hidden.out_dim() != output.in_dim() {
            return Err(Error::InvalidShape(format!(
                "hidden out_dim {} does not match output in_dim {}",
                hidden.out_dim(),
                output.in_dim()
            )));
        }
        Ok(Self {
            hidden,
            activation,
            output,
        })
    }

    pub fn new_with_seed(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        activation: Activation,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(input_dim, hidden_dim, output_dim, activation, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        let hidden = Layer::new_with_rng(input_dim, hidden_dim, Init::default(), rng)?;
        let output = Layer::new_with_rng(hidden_dim, output_dim, Init::default(), rng)?;
        Self::from_layers(hidden, activation, output)
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.hidden.in_dim()
    }

    #[inline]
    pub fn hidden_dim(&self) -> usize {
        self.hidden.out_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output.out_dim()
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn hidden_layer(&self) -> &Layer {
        &self.hidden
    }

    #[inline]
    pub fn output_layer(&self) -> &Layer {
        &self.output
    }

    #[inline]
    pub fn hidden_layer_mut(&mut self) -> &mut Layer {
        &mut self.hidden
    }

    #[inline]
    pub fn output_layer_mut(&mut self) -> &mut Layer {
        &mut self.output
    }

    pub fn scratch(&self) -> BatchScratch {
        BatchScratch {
            batch: 0,
            hidden: Vec::new(),
            output: Vec::new(),
            d_hidden: Vec::new(),
        }
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::zeros_like(self)
    }

    /// Batched forward pass.
    ///
    /// Writes intermediate activations into `scratch` and returns the outputs,
    /// shape `(batch, output_dim)`.
    ///
    /// Shape contract: `batch > 0` and `inputs.len() == batch * input_dim()`.
    pub fn forward_batch<'a>(
        &self,
        inputs: &[f32],
        batch: usize,
        scratch: &'a mut BatchScratch,
    ) -> &'a [f32] {
        assert!(batch > 0, "batch must be > 0");
        assert_eq!(
            inputs.len(),
            batch * self.input_dim(),
            "inputs len {} does not match batch * input_dim ({batch} * {})",
            inputs.len(),
            self.input_dim()
        );

        scratch.prepare(batch, self.hidden_dim(), self.output_dim());
        self.hidden.forward_batch(inputs, batch, &mut scratch.hidden);
        self.activation.apply(&mut scratch.hidden);
        self.output
            .forward_batch(&scratch.hidden, batch, &mut scratch.output);

        &scratch.output
    }

    /// Batched backward pass for the most recent `forward_batch` on `scratch`.
    ///
    /// `d_output` is `dL/d(output)`, shape `(batch, output_dim)`. `grads` is overwritten.
    pub fn backward_batch(
        &self,
        inputs: &[f32],
        scratch: &mut BatchScratch,
        d_output: &[f32],
        grads: &mut Gradients,
    ) {
        let batch = scratch.batch;
        let (in_dim, hidden_dim, out_dim) = (self.input_dim(), self.hidden_dim(), self.output_dim());
        assert!(batch > 0, "backward_batch called before forward_batch");
        assert_eq!(inputs.len(), batch * in_dim, "inputs shape mismatch");
        assert_eq!(d_output.len(), batch * out_dim, "d_output shape mismatch");
        assert_eq!(grads.num_groups(), 4, "grads must be built for an Mlp");

        linear_weight_grad(
            d_output,
            &scratch.hidden,
            batch,
            hidden_dim,
            out_dim,
            grads.group_mut(2),
        );
        column_sums(d_output, out_dim, grads.group_mut(3));

        linear_input_grad(
            d_output,
            self.output.weights(),
            batch,
            hidden_dim,
            out_dim,
            &mut scratch.d_hidden,
        );
        for (d, &y) in scratch.d_hidden.iter_mut().zip(&scratch.hidden) {
            *d *= self.activation.grad_from_output(y);
        }

        linear_weight_grad(
            &scratch.d_hidden,
            inputs,
            batch,
            in_dim,
            hidden_dim,
            grads.group_mut(0),
        );
        column_sums(&scratch.d_hidden, hidden_dim, grads.group_mut(1));
    }

    /// Shape-checked inference, returns `(len, output_dim)` outputs.
    pub fn predict(&self, inputs: &Inputs) -> Result<Vec<f32>> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        if inputs.input_dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "inputs input_dim {} does not match model input_dim {}",
                inputs.input_dim(),
                self.input_dim()
            )));
        }

        let mut scratch = self.scratch();
        Ok(self
            .forward_batch(inputs.as_slice(), inputs.len(), &mut scratch)
            .to_vec())
    }
}

impl Parameters for Mlp {
    fn num_param_groups(&self) -> usize {
        4
    }

    fn param_group(&self, idx: usize) -> &[f32] {
        match idx {
            0 => self.hidden.weights(),
            1 => self.hidden.biases(),
            2 => self.output.weights(),
            3 => self.output.biases(),
            _ => panic!("Mlp has 4 parameter groups, got index {idx}"),
        }
    }

    fn param_group_mut(&mut self, idx: usize) -> &mut [f32] {
        match idx {
            0 => self.hidden.weights_mut(),
            1 => self.hidden.biases_mut(),
            2 => self.output.weights_mut(),
            3 => self.output.biases_mut(),
            _ => panic!("Mlp has 4 parameter groups, got index {idx}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Loss;

    fn batch_loss(mlp: &Mlp, inputs: &[f32], targets: &[usize]) -> f32 {
        let mut scratch = mlp.scratch();
        let out = mlp.forward_batch(inputs, targets.len(), &mut scratch);
        let mut total = 0.0;
        for (row, &t) in out.chunks_exact(mlp.output_dim()).zip(targets) {
            total += Loss::CrossEntropy.forward(row, t);
        }
        total / targets.len() as f32
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = Mlp::new_with_seed(2, 3, 2, Activation::Tanh, 123).unwrap();
        let b = Mlp::new_with_seed(2, 3, 2, Activation::Tanh, 123).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn from_layers_rejects_mismatched_dims() {
        let hidden = Layer::from_parts(2, 3, vec![0.0; 6], vec![0.0; 3]).unwrap();
        let output = Layer::from_parts(4, 1, vec![0.0; 4], vec![0.0]).unwrap();
        assert!(Mlp::from_layers(hidden, Activation::ReLU, output).is_err());
    }

    #[test]
    fn forward_matches_hand_computation() {
        let hidden = Layer::from_parts(2, 2, vec![1.0, 0.0, 0.0, -1.0], vec![0.0, 0.0]).unwrap();
        let output = Layer::from_parts(2, 1, vec![1.0, 2.0], vec![0.5]).unwrap();
        let mlp = Mlp::from_layers(hidden, Activation::ReLU, output).unwrap();

        let x = Inputs::from_flat(vec![1.0, 2.0, -1.0, -3.0], 2).unwrap();
        // row 0: relu([1, -2]) = [1, 0] -> 1 + 0.5
        // row 1: relu([-1, 3]) = [0, 3] -> 6 + 0.5
        assert_eq!(mlp.predict(&x).unwrap(), vec![1.5, 6.5]);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut mlp = Mlp::new_with_seed(3, 4, 3, Activation::Sigmoid, 0).unwrap();
        let inputs = [0.3_f32, -0.7, 0.1, 0.9, 0.2, -0.4];
        let targets = [2_usize, 0];
        let batch = targets.len();

        let mut scratch = mlp.scratch();
        let out = mlp.forward_batch(&inputs, batch, &mut scratch).to_vec();
        let mut d_out = vec![0.0_f32; out.len()];
        for ((row, d), &t) in out
            .chunks_exact(3)
            .zip(d_out.chunks_exact_mut(3))
            .zip(&targets)
        {
            Loss::CrossEntropy.backward(row, t, 1.0 / batch as f32, d);
        }
        let mut grads = mlp.gradients();
        mlp.backward_batch(&inputs, &mut scratch, &d_out, &mut grads);

        let eps = 1e-3_f32;
        for group in 0..grads.num_groups() {
            let len = grads.group(group).len();
            for p in 0..len {
                let orig = mlp.param_group(group)[p];
                mlp.param_group_mut(group)[p] = orig + eps;
                let plus = batch_loss(&mlp, &inputs, &targets);
                mlp.param_group_mut(group)[p] = orig - eps;
                let minus = batch_loss(&mlp, &inputs, &targets);
                mlp.param_group_mut(group)[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.group(group)[p], numeric, 1e-3, 1e-2);
            }
        }
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mlp = Mlp::new_with_seed(2, 3, 1, Activation::ReLU, 0).unwrap();
        let mut scratch = mlp.scratch();
        mlp.forward_batch(&[0.0; 3], 1, &mut scratch);
    }
}
