use burn::tensor::backend::Backend;
use crate::image::Image;
use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;

/// Multi-resolution image pyramid.
///
/// One level per schedule entry, in the order given (coarsest first by
/// convention). Each level is built from the input: isotropic smoothing with
/// the level's sigma, in voxel units of the input, then subsampling by the
/// level's factor.
#[derive(Debug, Clone)]
pub struct MultiResolutionPyramid<B: Backend, const D: usize> {
    images: Vec<Image<B, D>>,
}

impl<B: Backend, const D: usize> MultiResolutionPyramid<B, D> {
    /// # Panics
    /// Panics if `sigmas` and `factors` differ in length.
    pub fn new(input: &Image<B, D>, sigmas: &[f64], factors: &[usize]) -> Self {
        assert_eq!(sigmas.len(), factors.len(), "Schedule lengths must match");

        let images = sigmas
            .iter()
            .zip(factors)
            .map(|(&sigma, &factor)| {
                let smoothed = if sigma > 1e-6 {
                    let physical: Vec<f64> = (0..D).map(|axis| sigma * input.spacing()[axis]).collect();
                    GaussianFilter::new(physical).apply(input)
                } else {
                    input.clone()
                };
                if factor > 1 {
                    DownsampleFilter::new(vec![factor]).apply(&smoothed)
                } else {
                    smoothed
                }
            })
            .collect();

        Self { images }
    }

    pub fn level(&self, level: usize) -> &Image<B, D> {
        &self.images[level]
    }

    pub fn levels(&self) -> usize {
        self.images.len()
    }

    /// Last level of the schedule.
    pub fn finest(&self) -> Option<&Image<B, D>> {
        self.images.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image<B, D>> {
        self.images.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, Point, Spacing};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_schedule_is_used_verbatim() {
        let device = Default::default();
        let image = Image::new(
            Tensor::<B, 3>::ones([10, 10, 10], &device),
            Point::new([5.0, 0.0, -5.0]),
            Spacing::uniform(2.0),
            Direction::identity(),
        );
        let pyramid = MultiResolutionPyramid::new(&image, &[3.0, 1.0], &[4, 2]);
        assert_eq!(pyramid.levels(), 2);
        assert_eq!(pyramid.level(0).shape(), [3, 3, 3]);
        assert_eq!(pyramid.level(1).shape(), [5, 5, 5]);
        assert_eq!(pyramid.level(0).spacing(), &Spacing::uniform(8.0));
        assert_eq!(pyramid.finest().unwrap().spacing(), &Spacing::uniform(4.0));
        assert_eq!(pyramid.level(1).origin(), image.origin());
    }

    #[test]
    fn test_identity_level_is_a_copy() {
        let device = Default::default();
        let values: Vec<f32> = (0..27).map(|v| v as f32).collect();
        let image = Image::new(
            Tensor::<B, 1>::from_floats(values.as_slice(), &device).reshape([3, 3, 3]),
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        );
        let pyramid = MultiResolutionPyramid::new(&image, &[0.0], &[1]);
        let level = pyramid.level(0).data().clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(level, values);
    }

    #[test]
    #[should_panic]
    fn test_mismatched_schedule_panics() {
        let device = Default::default();
        let image = Image::new(
            Tensor::<B, 3>::ones([4, 4, 4], &device),
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        );
        MultiResolutionPyramid::new(&image, &[1.0, 0.0], &[2]);
    }
}
