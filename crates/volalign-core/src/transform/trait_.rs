//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps points from one physical space to another.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to `[N, D]` points, returning `[N, D]` points.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
