//! Resample image filter.

use burn::tensor::backend::Backend;
use crate::image::{voxel_grid, Image};
use crate::interpolation::Interpolator;
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::Transform;

/// Resamples a volume onto a reference grid.
///
/// For each output voxel the world point is mapped through `transform`
/// (output space -> input space), converted to an input index and
/// interpolated. Points that land outside the input volume receive
/// `default_pixel_value`.
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    shape: [usize; 3],
    origin: Point<3>,
    spacing: Spacing<3>,
    direction: Direction<3>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    _b: std::marker::PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// Output geometry taken from `reference`.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        Self {
            shape: reference.shape(),
            origin: *reference.origin(),
            spacing: *reference.spacing(),
            direction: *reference.direction(),
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _b: std::marker::PhantomData,
        }
    }

    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.data().device();
        let output = Image::new(
            burn::tensor::Tensor::zeros(self.shape, &device),
            self.origin,
            self.spacing,
            self.direction,
        );

        let indices = voxel_grid::<B, 3>(self.shape, &device);
        let points = output.index_to_world_tensor(indices);
        let input_points = self.transform.transform_points(points);
        let input_indices = input.world_to_index_tensor(input_points);

        let mask = input.inside_mask(&input_indices);
        let values = self.interpolator.interpolate(input.data(), input_indices);
        let filled = values * mask.clone() + (mask.neg() + 1.0) * self.default_pixel_value;

        output.with_data(filled.reshape(self.shape))
    }
}
