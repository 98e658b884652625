//! Interpolator trait.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a `[Z, Y, X]` volume at continuous `(x, y, z)` indices.
///
/// Implementations must be built from differentiable tensor operations so that
/// gradients flow back to the indices under an autodiff backend.
pub trait Interpolator<B: Backend> {
    /// * `data` - volume `[Z, Y, X]`
    /// * `indices` - `[N, 3]` continuous indices
    ///
    /// Returns the `[N]` sampled values. Indices outside the grid are clamped
    /// to the border; callers mask them out where that matters.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
