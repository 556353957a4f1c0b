//! Optimizers.
//!
//! Optimizers update any parameter container that implements [`Parameters`]: the
//! parallel engine and a standalone extracted [`crate::Mlp`] expose their buffers the
//! same way, so one optimizer implementation drives both.
//!
//! Design notes:
//! - Optimizer *state* (momentum/Adam moments) lives outside the model.
//! - All updates are element-wise, so optimizing the packed parameters of many models
//!   at once is the same as optimizing every model on its own.

use crate::{Error, Result};

/// A model whose trainable parameters are a fixed list of flat buffers ("groups").
///
/// Group order and lengths must be stable for the lifetime of the model. Access is by
/// index so an optimizer step never has to collect the groups.
pub trait Parameters {
    fn num_param_groups(&self) -> usize;

    /// Panics if `idx >= self.num_param_groups()`.
    fn param_group(&self, idx: usize) -> &[f32];

    /// Panics if `idx >= self.num_param_groups()`.
    fn param_group_mut(&mut self, idx: usize) -> &mut [f32];

    fn param_groups(&self) -> Vec<&[f32]> {
        (0..self.num_param_groups())
            .map(|i| self.param_group(i))
            .collect()
    }
}

/// Parameter gradients, one buffer per parameter group (overwrite semantics).
///
/// Allocate once via [`Gradients::zeros_like`] and reuse across training steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    groups: Vec<Vec<f32>>,
}

impl Gradients {
    pub fn zeros_like<P: Parameters + ?Sized>(model: &P) -> Self {
        Self {
            groups: model
                .param_groups()
                .iter()
                .map(|g| vec![0.0; g.len()])
                .collect(),
        }
    }

    #[inline]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn group(&self, idx: usize) -> &[f32] {
        &self.groups[idx]
    }

    #[inline]
    pub fn group_mut(&mut self, idx: usize) -> &mut [f32] {
        &mut self.groups[idx]
    }

    fn check_matches<P: Parameters + ?Sized>(&self, model: &P) {
        let num_groups = model.num_param_groups();
        assert_eq!(
            num_groups,
            self.groups.len(),
            "grads have {} groups, model has {num_groups}",
            self.groups.len()
        );
        for (i, g) in self.groups.iter().enumerate() {
            let p = model.param_group(i);
            assert_eq!(
                p.len(),
                g.len(),
                "grad group {i} has len {}, parameter group has len {}",
                g.len(),
                p.len()
            );
        }
    }
}

/// Applies `param -= lr * grad` to every group.
pub fn sgd_step<P: Parameters + ?Sized>(model: &mut P, grads: &Gradients, lr: f32) {
    assert!(
        lr.is_finite() && lr > 0.0,
        "learning rate must be finite and > 0"
    );
    grads.check_matches(model);

    for (i, g) in grads.groups.iter().enumerate() {
        for (p, &d) in model.param_group_mut(i).iter_mut().zip(g) {
            *p -= lr * d;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    #[default]
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Optimizer {
    /// Adam with the usual `(0.9, 0.999, 1e-8)` hyperparameters.
    pub const ADAM: Optimizer = Optimizer::Adam {
        beta1: 0.9,
        beta2: 0.999,
        eps: 1e-8,
    };

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state<P: Parameters + ?Sized>(self, model: &P) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd),
            Optimizer::SgdMomentum { momentum } => Ok(OptimizerState::SgdMomentum {
                momentum,
                velocity: zeros_like_params(model),
            }),
            Optimizer::Adam { beta1, beta2, eps } => Ok(OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros_like_params(model),
                v: zeros_like_params(model),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Owned optimizer state.
pub enum OptimizerState {
    /// Plain SGD (no state).
    #[default]
    Sgd,
    /// SGD with momentum state.
    SgdMomentum {
        momentum: f32,
        velocity: Vec<Vec<f32>>,
    },
    /// Adam state.
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        t: u64,
        beta1_pow: f32,
        beta2_pow: f32,
        m: Vec<Vec<f32>>,
        v: Vec<Vec<f32>>,
    },
}

impl OptimizerState {
    /// Apply one optimizer step.
    ///
    /// `grads` may be overwritten with the update direction.
    pub fn step<P: Parameters + ?Sized>(&mut self, model: &mut P, grads: &mut Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        match self {
            OptimizerState::Sgd => {}
            OptimizerState::SgdMomentum { momentum, velocity } => {
                debug_assert_eq!(velocity.len(), grads.num_groups());

                for (vel, g) in velocity.iter_mut().zip(&mut grads.groups) {
                    for (v, d) in vel.iter_mut().zip(g.iter_mut()) {
                        *v = (*momentum) * *v + *d;
                        *d = *v;
                    }
                }
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *t += 1;
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let one_minus_beta1 = 1.0 - *beta1;
                let one_minus_beta2 = 1.0 - *beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                // Overwrite `grads` with the Adam update direction and then reuse `sgd_step`.
                for ((mg, vg), upd) in m.iter_mut().zip(v.iter_mut()).zip(&mut grads.groups) {
                    debug_assert_eq!(mg.len(), upd.len());
                    for i in 0..upd.len() {
                        let g = upd[i];
                        mg[i] = (*beta1) * mg[i] + one_minus_beta1 * g;
                        vg[i] = (*beta2) * vg[i] + one_minus_beta2 * (g * g);

                        let m_hat = mg[i] / corr1;
                        let v_hat = vg[i] / corr2;
                        upd[i] = m_hat / (v_hat.sqrt() + *eps);
                    }
                }
            }
        }

        sgd_step(model, grads, lr);
    }
}

fn zeros_like_params<P: Parameters + ?Sized>(model: &P) -> Vec<Vec<f32>> {
    model
        .param_groups()
        .iter()
        .map(|g| vec![0.0; g.len()])
        .collect()
}
