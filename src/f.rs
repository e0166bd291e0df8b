use ndarray::{Array2, Axis};
use ndarray_rand::{
    RandomExt,
    rand::Rng,
    rand_distr::Uniform,
};
use ndarray_stats::QuantileExt;

use crate::Float;

// NORMALIZATION

/// Row-wise softmax. Entries at `-inf` get weight 0; a row that is `-inf`
/// everywhere comes out as zeros rather than NaN.
pub fn softmax(x: &Array2<Float>) -> Array2<Float> {
    let mut out = x.to_owned();

    for mut row in out.axis_iter_mut(Axis(0)) {
        // NaN rows have no max and stay NaN
        let max = row.max().copied().unwrap_or(Float::NAN);

        if max == Float::NEG_INFINITY {
            row.fill(0.);
            continue;
        }

        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    out
}

pub fn softmax_vector_jacobian_product(
    upstream: &Array2<Float>,
    softmax_out: &Array2<Float>,
) -> Array2<Float> {
    let mut grad = upstream.clone();

    for ((mut g_row, s_row), u_row) in grad
        .axis_iter_mut(Axis(0))
        .zip(softmax_out.axis_iter(Axis(0)))
        .zip(upstream.axis_iter(Axis(0)))
    {
        let dot = u_row.dot(&s_row);

        for ((g, &s), &u) in g_row.iter_mut().zip(s_row.iter()).zip(u_row.iter()) {
            *g = s * (u - dot);
        }
    }

    grad
}

// MASKING

/// Additive mask bias: `ln(1) = 0` keeps a step, `ln(0) = -inf` removes it.
pub fn log_mask(mask: &Array2<Float>) -> Array2<Float> {
    mask.mapv(Float::ln)
}

// INITIALIZATION

/// Draws from `Uniform(-bound, bound)`. `bound` must be finite.
pub fn uniform<R: Rng + ?Sized>(shape: (usize, usize), bound: Float, rng: &mut R) -> Array2<Float> {
    let bound = bound.abs();
    Array2::random_using(shape, Uniform::new_inclusive(-bound, bound), rng)
}
