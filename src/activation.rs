//! Activation functions.
//!
//! The parallel engine splits its hidden layer into `K` equal, contiguous segments and
//! applies one activation per segment. Activations are a closed set, so they are a plain
//! enum rather than trait objects.
//!
//! Hidden outputs are cached *post-activation*. During backprop `dL/dz` is computed
//! from `dL/dy` using `y` only, so no separate pre-activation buffer is kept.

use std::fmt;
use std::mem;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Element-wise activation function.
pub enum Activation {
    Tanh,
    ReLU,
    LeakyReLU { alpha: f32 },
    Sigmoid,
    Identity,
}

impl Activation {
    /// Leaky ReLU with the conventional negative slope of `0.01`.
    pub const LEAKY_RELU: Activation = Activation::LeakyReLU { alpha: 0.01 };

    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Tanh | Activation::ReLU | Activation::Sigmoid | Activation::Identity => {}
        }

        Ok(())
    }

    /// Returns true if both activations are the same function family.
    ///
    /// Parameters are ignored: two leaky ReLUs with different slopes share a kind.
    #[inline]
    pub fn same_kind(self, other: Activation) -> bool {
        mem::discriminant(&self) == mem::discriminant(&other)
    }

    /// Short lowercase name, used in logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "identity",
        }
    }

    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// Applies the activation in place to a contiguous segment.
    #[inline]
    pub(crate) fn apply(self, segment: &mut [f32]) {
        if self == Activation::Identity {
            return;
        }
        for v in segment.iter_mut() {
            *v = self.forward(*v);
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::LeakyReLU { alpha } => write!(f, "leaky_relu(alpha={alpha})"),
            other => f.write_str(other.name()),
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
