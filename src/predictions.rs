//! Batched per-model outputs.

use crate::{Error, Result};

/// Output of a parallel forward pass, shape `(batch_size, num_models, out_features)`,
/// stored row-major.
///
/// The same type carries gradients w.r.t. those outputs during backprop.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    values: Vec<f32>,
    batch_size: usize,
    num_models: usize,
    out_features: usize,
}

impl Predictions {
    /// All-zero buffer of the given shape.
    pub fn zeros(batch_size: usize, num_models: usize, out_features: usize) -> Self {
        Self {
            values: vec![0.0; batch_size * num_models * out_features],
            batch_size,
            num_models,
            out_features,
        }
    }

    /// Wrap a flat buffer of shape `(batch_size, num_models, out_features)`.
    pub fn from_flat(
        values: Vec<f32>,
        batch_size: usize,
        num_models: usize,
        out_features: usize,
    ) -> Result<Self> {
        if num_models == 0 || out_features == 0 {
            return Err(Error::InvalidShape(format!(
                "num_models ({num_models}) and out_features ({out_features}) must be > 0"
            )));
        }
        if values.len() != batch_size * num_models * out_features {
            return Err(Error::InvalidShape(format!(
                "values length {} does not match {batch_size} * {num_models} * {out_features}",
                values.len()
            )));
        }
        Ok(Self {
            values,
            batch_size,
            num_models,
            out_features,
        })
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn num_models(&self) -> usize {
        self.num_models
    }

    #[inline]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Output vector of `model` for sample `sample` (shape: `(out_features,)`).
    #[inline]
    pub fn row(&self, sample: usize, model: usize) -> &[f32] {
        let start = (sample * self.num_models + model) * self.out_features;
        &self.values[start..start + self.out_features]
    }

    #[inline]
    pub fn row_mut(&mut self, sample: usize, model: usize) -> &mut [f32] {
        let start = (sample * self.num_models + model) * self.out_features;
        &mut self.values[start..start + self.out_features]
    }

    /// Copy out a single model's outputs as a `(batch_size, out_features)` buffer.
    pub fn model(&self, model: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.batch_size * self.out_features);
        for b in 0..self.batch_size {
            out.extend_from_slice(self.row(b, model));
        }
        out
    }

    /// Arg-max over the output axis, shape `(batch_size, num_models)`.
    ///
    /// Ties resolve to the first maximal index.
    pub fn argmax(&self) -> Vec<usize> {
        self.values
            .chunks_exact(self.out_features)
            .map(argmax)
            .collect()
    }
}

#[inline]
pub(crate) fn argmax(xs: &[f32]) -> usize {
    let mut best = 0;
    for (i, &x) in xs.iter().enumerate().skip(1) {
        if x > xs[best] {
            best = i;
        }
    }
    best
}
