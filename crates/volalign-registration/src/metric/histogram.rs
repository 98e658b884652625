//! Differentiable joint histograms using Parzen windowing.

use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

const EPSILON: f64 = 1e-10;

/// Joint histogram calculator with a Gaussian Parzen window.
///
/// Intensities are first mapped to continuous bin coordinates in
/// `[0, num_bins - 1]`; each sample then spreads a unit mass over the bins
/// with Gaussian weights of width `parzen_sigma` (in bins).
#[derive(Clone, Debug)]
pub struct ParzenJointHistogram<B: Backend> {
    pub num_bins: usize,
    pub parzen_sigma: f64,
    _phantom: PhantomData<B>,
}

impl<B: Backend> ParzenJointHistogram<B> {
    pub fn new(num_bins: usize, parzen_sigma: f64) -> Self {
        Self {
            num_bins,
            parzen_sigma,
            _phantom: PhantomData,
        }
    }

    /// Map intensities in `[min, max]` linearly onto `[0, num_bins - 1]`,
    /// clamping anything outside. A degenerate range maps everything to bin 0.
    pub fn bin_coordinates(&self, values: Tensor<B, 1>, min: f64, max: f64) -> Tensor<B, 1> {
        let top = (self.num_bins - 1) as f64;
        let range = max - min;
        if !(range > f64::EPSILON) {
            return values.zeros_like();
        }
        ((values - min) * (top / range)).clamp(0.0, top)
    }

    /// Per-sample bin weights `[N, num_bins]`, each row summing to one.
    pub fn weights(&self, coordinates: Tensor<B, 1>) -> Tensor<B, 2> {
        let device = coordinates.device();
        let [n] = coordinates.dims();
        let bins = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &device)
            .float()
            .reshape([1, self.num_bins]);

        let diff = coordinates.reshape([n, 1]) - bins;
        let kernel = (diff.powf_scalar(2.0) * (-0.5 / (self.parzen_sigma * self.parzen_sigma))).exp();
        let norm = kernel.clone().sum_dim(1) + EPSILON;
        kernel / norm
    }

    /// Unnormalized joint histogram `W_fixedᵀ · (mask ⊙ W_moving)`, `[bins, bins]`.
    pub fn joint(&self, fixed_weights: Tensor<B, 2>, moving_weights: Tensor<B, 2>, mask: Tensor<B, 1>) -> Tensor<B, 2> {
        let [n, _] = moving_weights.dims();
        let masked = moving_weights * mask.reshape([n, 1]);
        fixed_weights.transpose().matmul(masked)
    }

    /// Mutual information of a joint histogram with positive total mass.
    ///
    /// `MI = Σ p(x, y) · (ln p(x, y) - ln p(x) p(y))`
    pub fn mutual_information(joint: Tensor<B, 2>) -> Tensor<B, 1> {
        let total = joint.clone().sum().reshape([1, 1]);
        let p = joint / total;
        let p_fixed = p.clone().sum_dim(1);
        let p_moving = p.clone().sum_dim(0);
        let product = p_fixed.matmul(p_moving);

        let ratio = (p.clone() + EPSILON).log() - (product + EPSILON).log();
        (p * ratio).sum()
    }
}
