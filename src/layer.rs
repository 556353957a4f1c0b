use rand::Rng;

use crate::{Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// He/Kaiming uniform with leaky-ReLU slope `a`:
    /// `U(-b, b)` with `b = sqrt(6 / ((1 + a^2) * fan_in))`.
    KaimingUniform { a: f32 },
}

impl Default for Init {
    /// The conventional linear-layer default, `a = sqrt(5)`, which gives
    /// `b = 1 / sqrt(fan_in)`.
    fn default() -> Self {
        Init::KaimingUniform { a: 5.0_f32.sqrt() }
    }
}

impl Init {
    /// Half-width of the uniform weight distribution for a given fan-in.
    #[inline]
    pub fn weight_bound(self, fan_in: usize) -> f32 {
        match self {
            Init::KaimingUniform { a } => {
                let gain = (2.0 / (1.0 + a * a)).sqrt();
                gain * (3.0 / fan_in as f32).sqrt()
            }
        }
    }

    /// Fill `weights` from `U(-b, b)`, `b = weight_bound(fan_in)`.
    pub fn fill_weights<'a, R, I>(self, weights: I, fan_in: usize, rng: &mut R)
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = &'a mut f32>,
    {
        fill_uniform(weights, self.weight_bound(fan_in), rng);
    }
}

/// Half-width of the uniform bias distribution: `1 / sqrt(fan_in)`.
#[inline]
pub fn bias_bound(fan_in: usize) -> f32 {
    1.0 / (fan_in as f32).sqrt()
}

pub(crate) fn fill_uniform<'a, R, I>(values: I, bound: f32, rng: &mut R)
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a mut f32>,
{
    for v in values {
        *v = rng.gen_range(-bound..bound);
    }
}

/// Dense affine layer `y = W x + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Build a randomly initialized layer.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let mut weights = vec![0.0; in_dim * out_dim];
        let mut biases = vec![0.0; out_dim];
        init.fill_weights(weights.iter_mut(), in_dim, rng);
        fill_uniform(biases.iter_mut(), bias_bound(in_dim), rng);

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
        })
    }

    /// Build a layer from explicit parameters.
    ///
    /// `weights` is row-major `(out_dim, in_dim)`. All values must be finite.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }
        Self::from_parts_unchecked_values(in_dim, out_dim, weights, biases)
    }

    /// Like [`Layer::from_parts`] but only checks shapes.
    ///
    /// Used to copy parameters out of a trained engine, where a diverged model
    /// may legitimately hold inf or NaN.
    pub(crate) fn from_parts_unchecked_values(
        in_dim: usize,
        out_dim: usize,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidShape(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Batched forward pass: `outputs = inputs * W^T + b`.
    ///
    /// Shape contract:
    /// - `inputs.len() == batch * in_dim`
    /// - `outputs.len() == batch * out_dim`
    #[inline]
    pub fn forward_batch(&self, inputs: &[f32], batch: usize, outputs: &mut [f32]) {
        crate::matmul::linear_forward(
            inputs,
            batch,
            self.in_dim,
            &self.weights,
            &self.biases,
            self.out_dim,
            outputs,
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn default_init_bound_is_inverse_sqrt_fan_in() {
        for fan_in in [1, 3, 16, 100] {
            let b = Init::default().weight_bound(fan_in);
            assert!((b - bias_bound(fan_in)).abs() < 1e-6, "fan_in={fan_in}");
        }
    }

    #[test]
    fn new_with_rng_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new_with_rng(4, 8, Init::default(), &mut rng).unwrap();
        let bound = 0.5; // 1 / sqrt(4)
        assert!(layer.weights().iter().all(|w| w.abs() <= bound));
        assert!(layer.biases().iter().all(|b| b.abs() <= bound));
        assert!(layer.weights().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn from_parts_validates_shapes_and_values() {
        assert!(Layer::from_parts(2, 1, vec![1.0, 2.0], vec![0.0]).is_ok());
        assert!(Layer::from_parts(2, 1, vec![1.0], vec![0.0]).is_err());
        assert!(Layer::from_parts(2, 1, vec![1.0, 2.0], vec![]).is_err());
        assert!(Layer::from_parts(2, 1, vec![1.0, f32::NAN], vec![0.0]).is_err());
        assert!(Layer::from_parts_unchecked_values(2, 1, vec![1.0, f32::NAN], vec![0.0]).is_ok());
        assert!(Layer::from_parts_unchecked_values(2, 1, vec![1.0], vec![0.0]).is_err());
    }
}
