//! Metric trait for image similarity measurement.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use volalign_core::image::Image;
use volalign_core::transform::Transform;
use crate::error::Result;

/// Dissimilarity between a fixed image and a moving image seen through a
/// transform. Lower is better.
pub trait Metric<B: Backend> {
    /// Scalar loss tensor, differentiable with respect to the transform
    /// when the backend tracks gradients.
    ///
    /// # Arguments
    /// * `fixed` - The fixed (reference) image
    /// * `moving` - The moving image
    /// * `transform` - Maps fixed world points into moving world space
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Result<Tensor<B, 1>>;

    fn name(&self) -> &'static str;
}
