use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use crate::image::Image;

/// Integer subsampling.
///
/// Keeps voxels `0, f, 2f, ...` along each axis, so the origin is unchanged and
/// the spacing grows by the factor.
pub struct DownsampleFilter<B: Backend> {
    /// Per index axis `(x, y, z)`; a single value applies to every axis.
    factors: Vec<usize>,
    _b: PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    pub fn new(factors: Vec<usize>) -> Self {
        Self {
            factors,
            _b: PhantomData,
        }
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let mut data = image.data().clone();
        let device = data.device();
        let dims: [usize; D] = data.dims();
        let mut factors = [1usize; D];

        for dim in 0..D {
            let axis = D - 1 - dim;
            let factor = self.factors.get(axis).or(self.factors.first()).copied().unwrap_or(1);
            if factor <= 1 {
                continue;
            }
            let kept: Vec<i64> = (0..dims[dim]).step_by(factor).map(|i| i as i64).collect();
            let kept = Tensor::<B, 1, Int>::from_ints(kept.as_slice(), &device);
            data = data.select(dim, kept);
            factors[axis] = factor;
        }

        Image::new(
            data,
            *image.origin(),
            image.spacing().scaled(factors),
            *image.direction(),
        )
    }
}
