//! Closed-form initialization from intensity-weighted centroids.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use volalign_core::image::Image;
use volalign_core::spatial::Point;
use volalign_core::transform::{TransformKind, TransformParameters};

const MIN_TOTAL_INTENSITY: f64 = 1e-12;

/// Intensity-weighted world centroid. Negative intensities count as zero.
///
/// Falls back to the geometric center when the total intensity vanishes.
pub fn center_of_mass<B: Backend>(image: &Image<B, 3>) -> Point<3> {
    let n = image.num_voxels();
    let weights = image.data().clone().clamp_min(0.0).reshape([n, 1]);
    let total = weights.clone().sum().into_scalar().elem::<f64>();
    if !(total.is_finite() && total > MIN_TOTAL_INTENSITY) {
        return image.world_center();
    }

    let weighted = image.world_grid() * weights;
    let mut centroid = Point::<3>::origin();
    for axis in 0..3 {
        let sum = weighted.clone().narrow(1, axis, 1).sum().into_scalar().elem::<f64>();
        centroid[axis] = sum / total;
    }
    centroid
}

/// Translation taking the fixed centroid onto the moving centroid.
pub fn center_of_mass_alignment<B: Backend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    center: Point<3>,
) -> TransformParameters {
    let offset = center_of_mass(moving) - center_of_mass(fixed);
    let values = offset.to_array().to_vec();
    TransformParameters::new(TransformKind::Translation, values, center)
        .unwrap_or_else(|| TransformParameters::identity(TransformKind::Translation, center))
}
