//! Per-sample classification losses.
//!
//! Targets are integer class ids. Every loss scores one output vector (logits of
//! length `K`) against one class id and can write its gradient w.r.t. the logits.
//!
//! The parallel engine needs one loss value per sample and per model, so it only
//! accepts [`Reduction::None`]; reducing is left to the caller.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Supported loss functions.
pub enum Loss {
    /// Softmax cross-entropy: `logsumexp(x) - x[target]`.
    #[default]
    CrossEntropy,
    /// Mean squared error against the one-hot target, averaged over outputs.
    Mse,
    /// Mean absolute error against the one-hot target, averaged over outputs.
    Mae,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How per-sample losses are combined.
pub enum Reduction {
    /// Keep one value per sample.
    #[default]
    None,
    Mean,
    Sum,
}

/// A loss together with its reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LossFn {
    pub loss: Loss,
    pub reduction: Reduction,
}

impl LossFn {
    pub fn new(loss: Loss, reduction: Reduction) -> Self {
        Self { loss, reduction }
    }

    /// Unreduced loss, the only form the parallel engine accepts.
    pub fn unreduced(loss: Loss) -> Self {
        Self::new(loss, Reduction::None)
    }

    /// Combine per-sample values according to the reduction.
    ///
    /// `Reduction::None` returns the values unchanged.
    pub fn reduce(&self, per_sample: Vec<f32>) -> Vec<f32> {
        match self.reduction {
            Reduction::None => per_sample,
            Reduction::Sum => vec![per_sample.iter().sum()],
            Reduction::Mean => {
                let n = per_sample.len().max(1) as f32;
                vec![per_sample.iter().sum::<f32>() / n]
            }
        }
    }
}

impl Loss {
    /// Loss for a single output vector.
    ///
    /// Shape contract: `target < logits.len()`.
    #[inline]
    pub fn forward(self, logits: &[f32], target: usize) -> f32 {
        debug_assert!(target < logits.len());
        match self {
            Loss::CrossEntropy => log_sum_exp(logits) - logits[target],
            Loss::Mse => {
                let inv_k = 1.0 / logits.len() as f32;
                let mut sum_sq = 0.0_f32;
                for (k, &x) in logits.iter().enumerate() {
                    let diff = x - one_hot(k, target);
                    sum_sq = diff.mul_add(diff, sum_sq);
                }
                sum_sq * inv_k
            }
            Loss::Mae => {
                let inv_k = 1.0 / logits.len() as f32;
                let mut sum = 0.0_f32;
                for (k, &x) in logits.iter().enumerate() {
                    sum += (x - one_hot(k, target)).abs();
                }
                sum * inv_k
            }
        }
    }

    /// Loss + gradient w.r.t. `logits`, scaled by `scale`.
    ///
    /// Writes `d_logits = scale * dL/d(logits)` and returns the unscaled loss.
    ///
    /// Shape contract: `logits.len() == d_logits.len()` and `target < logits.len()`.
    #[inline]
    pub fn backward(self, logits: &[f32], target: usize, scale: f32, d_logits: &mut [f32]) -> f32 {
        assert_eq!(
            logits.len(),
            d_logits.len(),
            "logits len {} does not match d_logits len {}",
            logits.len(),
            d_logits.len()
        );
        debug_assert!(target < logits.len());

        match self {
            Loss::CrossEntropy => {
                let max_logit = max(logits);
                let mut sum_exp = 0.0_f32;
                for (d, &x) in d_logits.iter_mut().zip(logits) {
                    *d = (x - max_logit).exp();
                    sum_exp += *d;
                }
                let inv_sum = 1.0 / sum_exp;
                for (k, d) in d_logits.iter_mut().enumerate() {
                    *d = scale * (*d * inv_sum - one_hot(k, target));
                }
                max_logit + sum_exp.ln() - logits[target]
            }
            Loss::Mse => {
                let inv_k = 1.0 / logits.len() as f32;
                let mut sum_sq = 0.0_f32;
                for (k, (d, &x)) in d_logits.iter_mut().zip(logits).enumerate() {
                    let diff = x - one_hot(k, target);
                    sum_sq = diff.mul_add(diff, sum_sq);
                    *d = scale * 2.0 * diff * inv_k;
                }
                sum_sq * inv_k
            }
            Loss::Mae => {
                let inv_k = 1.0 / logits.len() as f32;
                let mut sum = 0.0_f32;
                for (k, (d, &x)) in d_logits.iter_mut().zip(logits).enumerate() {
                    let diff = x - one_hot(k, target);
                    sum += diff.abs();
                    // Subgradient 0 at diff == 0.
                    *d = if diff > 0.0 {
                        scale * inv_k
                    } else if diff < 0.0 {
                        -scale * inv_k
                    } else {
                        0.0
                    };
                }
                sum * inv_k
            }
        }
    }
}

/// Check that every target is a valid class id for `num_classes` outputs.
pub(crate) fn validate_targets(targets: &[usize], num_classes: usize) -> Result<()> {
    match targets.iter().position(|&t| t >= num_classes) {
        Some(i) => Err(Error::InvalidData(format!(
            "target {} at index {i} is out of range for {num_classes} outputs",
            targets[i]
        ))),
        None => Ok(()),
    }
}

#[inline]
fn one_hot(k: usize, target: usize) -> f32 {
    if k == target { 1.0 } else { 0.0 }
}

#[inline]
fn max(xs: &[f32]) -> f32 {
    xs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

#[inline]
fn log_sum_exp(xs: &[f32]) -> f32 {
    let max_x = max(xs);
    let mut sum_exp = 0.0_f32;
    for &x in xs {
        sum_exp += (x - max_x).exp();
    }
    max_x + sum_exp.ln()
}
