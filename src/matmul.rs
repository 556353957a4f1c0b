//! Small GEMM wrapper and the affine-layer kernels built on it.
//!
//! All matrices are flat row-major `f32` buffers. Weights use the `(out_dim, in_dim)`
//! layout, so a forward pass is `Z = X * W^T + b`.
//!
//! Backends:
//! - default: a simple, safe triple-loop implementation
//! - optional: a faster backend via the `matrixmultiply` feature

/// `C = alpha * A * B + beta * C` with arbitrary (non-negative) strides.
///
/// Shapes: `A` is `(m, k)`, `B` is `(k, n)`, `C` is `(m, n)`.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    rsa: usize,
    csa: usize,
    b: &[f32],
    rsb: usize,
    csb: usize,
    beta: f32,
    c: &mut [f32],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);

    #[cfg(feature = "matrixmultiply")]
    {
        // Callers validate buffer lengths against (m, n, k) and the strides.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                let av = a[a0 + p * csa];
                let bv = b[p * rsb + b0];
                acc = av.mul_add(bv, acc);
            }

            let idx = i * rsc + j * csc;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

/// `outputs = inputs * weights^T + biases`.
///
/// Shapes: `inputs` `(batch, in_dim)`, `weights` `(out_dim, in_dim)`,
/// `biases` `(out_dim,)`, `outputs` `(batch, out_dim)`.
pub(crate) fn linear_forward(
    inputs: &[f32],
    batch: usize,
    in_dim: usize,
    weights: &[f32],
    biases: &[f32],
    out_dim: usize,
    outputs: &mut [f32],
) {
    assert_eq!(inputs.len(), batch * in_dim, "inputs shape mismatch");
    assert_eq!(weights.len(), out_dim * in_dim, "weights shape mismatch");
    assert_eq!(biases.len(), out_dim, "biases shape mismatch");
    assert_eq!(outputs.len(), batch * out_dim, "outputs shape mismatch");

    gemm_f32(
        batch, out_dim, in_dim, 1.0, inputs, in_dim, 1, weights, 1, in_dim, 0.0, outputs,
        out_dim, 1,
    );
    for row in outputs.chunks_exact_mut(out_dim) {
        for (o, &b) in row.iter_mut().zip(biases) {
            *o += b;
        }
    }
}

/// `d_weights = d_outputs^T * inputs` (overwrite semantics).
///
/// Shapes: `d_outputs` `(batch, out_dim)`, `inputs` `(batch, in_dim)`,
/// `d_weights` `(out_dim, in_dim)`.
pub(crate) fn linear_weight_grad(
    d_outputs: &[f32],
    inputs: &[f32],
    batch: usize,
    in_dim: usize,
    out_dim: usize,
    d_weights: &mut [f32],
) {
    assert_eq!(d_outputs.len(), batch * out_dim, "d_outputs shape mismatch");
    assert_eq!(inputs.len(), batch * in_dim, "inputs shape mismatch");
    assert_eq!(d_weights.len(), out_dim * in_dim, "d_weights shape mismatch");

    gemm_f32(
        out_dim, in_dim, batch, 1.0, d_outputs, 1, out_dim, inputs, in_dim, 1, 0.0, d_weights,
        in_dim, 1,
    );
}

/// `d_inputs = d_outputs * weights` (overwrite semantics).
///
/// Shapes: `d_outputs` `(batch, out_dim)`, `weights` `(out_dim, in_dim)`,
/// `d_inputs` `(batch, in_dim)`.
pub(crate) fn linear_input_grad(
    d_outputs: &[f32],
    weights: &[f32],
    batch: usize,
    in_dim: usize,
    out_dim: usize,
    d_inputs: &mut [f32],
) {
    assert_eq!(d_outputs.len(), batch * out_dim, "d_outputs shape mismatch");
    assert_eq!(weights.len(), out_dim * in_dim, "weights shape mismatch");
    assert_eq!(d_inputs.len(), batch * in_dim, "d_inputs shape mismatch");

    gemm_f32(
        batch, in_dim, out_dim, 1.0, d_outputs, out_dim, 1, weights, in_dim, 1, 0.0, d_inputs,
        in_dim, 1,
    );
}

/// Sum over the batch axis: `sums[j] = sum_b rows[b, j]` (overwrite semantics).
pub(crate) fn column_sums(rows: &[f32], cols: usize, sums: &mut [f32]) {
    assert_eq!(sums.len(), cols, "sums shape mismatch");
    sums.fill(0.0);
    for row in rows.chunks_exact(cols) {
        for (s, &v) in sums.iter_mut().zip(row) {
            *s += v;
        }
    }
}
