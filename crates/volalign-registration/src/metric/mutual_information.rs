//! Mutual Information metric implementation.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use volalign_core::image::{strided_voxel_grid, voxel_grid, Image};
use volalign_core::interpolation::{Interpolator, LinearInterpolator};
use volalign_core::transform::Transform;
use crate::error::{self, RegistrationError};
use super::histogram::ParzenJointHistogram;
use super::trait_::Metric;

/// Samples per chunk when accumulating the joint histogram.
const CHUNK_SIZE: usize = 32768;

#[derive(Config, Debug)]
pub struct MutualInformationConfig {
    #[config(default = 32)]
    pub num_bins: usize,
    /// Parzen window standard deviation, in bins.
    #[config(default = 1.0)]
    pub parzen_sigma: f64,
    /// Use every `round(1 / p)`-th fixed voxel instead of all of them.
    pub sampling_proportion: Option<f64>,
}

impl MutualInformationConfig {
    pub fn init<B: Backend>(&self) -> MutualInformation<B> {
        MutualInformation::new(self)
    }
}

/// Fixed-image side of the metric, computed once per pyramid level.
#[derive(Debug, Clone)]
pub struct FixedSamples<B: Backend> {
    chunks: Vec<SampleChunk<B>>,
    num_samples: usize,
}

#[derive(Debug, Clone)]
struct SampleChunk<B: Backend> {
    /// World coordinates `[n, 3]`.
    points: Tensor<B, 2>,
    /// Parzen weights `[n, bins]`.
    weights: Tensor<B, 2>,
}

impl<B: Backend> FixedSamples<B> {
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }
}

/// Mutual information between fixed and moving intensities, estimated
/// from a Parzen-windowed joint histogram.
///
/// Fixed voxel centers (all, or a deterministic strided subset) are mapped
/// through the transform into the moving volume and sampled with trilinear
/// interpolation. Samples that land outside the moving grid are masked out.
/// Intensities are binned using each volume's own min/max.
///
/// The loss returned by [`Metric::forward`] is `-MI`.
#[derive(Debug, Clone)]
pub struct MutualInformation<B: Backend> {
    histogram: ParzenJointHistogram<B>,
    interpolator: LinearInterpolator,
    sampling_proportion: Option<f64>,
}

impl<B: Backend> MutualInformation<B> {
    pub fn new(config: &MutualInformationConfig) -> Self {
        Self {
            histogram: ParzenJointHistogram::new(config.num_bins, config.parzen_sigma),
            interpolator: LinearInterpolator::new(),
            sampling_proportion: config.sampling_proportion,
        }
    }

    /// Sample points and bin weights of the fixed image.
    pub fn sample_fixed(&self, fixed: &Image<B, 3>) -> FixedSamples<B> {
        let device = fixed.data().device();
        let shape = fixed.shape();

        let (indices, values) = match self.sampling_proportion {
            Some(p) if p < 1.0 => {
                let indices = strided_voxel_grid::<B, 3>(shape, p, &device);
                let values = self.interpolator.interpolate(fixed.data(), indices.clone());
                (indices, values)
            }
            _ => (
                voxel_grid::<B, 3>(shape, &device),
                fixed.data().clone().reshape([fixed.num_voxels()]),
            ),
        };
        let [n, _] = indices.dims();

        let (min, max) = intensity_range(fixed.data());
        let points = fixed.index_to_world_tensor(indices);
        let coordinates = self.histogram.bin_coordinates(values, min, max);

        let chunks = (0..n)
            .step_by(CHUNK_SIZE)
            .map(|start| {
                let end = (start + CHUNK_SIZE).min(n);
                SampleChunk {
                    points: points.clone().slice([start..end]),
                    weights: self.histogram.weights(coordinates.clone().slice([start..end])),
                }
            })
            .collect();

        FixedSamples { chunks, num_samples: n }
    }

    /// `-MI` for pre-computed fixed samples.
    ///
    /// # Errors
    /// [`RegistrationError::EmptyOverlap`] when no sample maps inside the
    /// moving volume.
    pub fn forward_samples(
        &self,
        samples: &FixedSamples<B>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> error::Result<Tensor<B, 1>> {
        let (min, max) = intensity_range(moving.data());
        let mut joint: Option<Tensor<B, 2>> = None;
        let mut overlap = 0.0;

        for chunk in &samples.chunks {
            let moving_points = transform.transform_points(chunk.points.clone());
            let moving_indices = moving.world_to_index_tensor(moving_points);
            let mask = moving.inside_mask(&moving_indices);
            overlap += mask.clone().sum().into_scalar().elem::<f64>();

            let values = self.interpolator.interpolate(moving.data(), moving_indices);
            let weights = self.histogram.weights(self.histogram.bin_coordinates(values, min, max));
            let partial = self.histogram.joint(chunk.weights.clone(), weights, mask);
            joint = Some(match joint {
                Some(acc) => acc + partial,
                None => partial,
            });
        }

        let joint = match joint {
            Some(joint) if overlap >= 1.0 => joint,
            _ => {
                return Err(RegistrationError::empty_overlap(format!(
                    "none of {} fixed samples maps inside the moving volume",
                    samples.num_samples
                )))
            }
        };

        let mi = ParzenJointHistogram::mutual_information(joint);
        Ok(mi.neg())
    }

    /// Mutual information as a plain number.
    pub fn similarity(
        &self,
        samples: &FixedSamples<B>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> error::Result<f64> {
        let loss = self.forward_samples(samples, moving, transform)?;
        let value = -loss.into_scalar().elem::<f64>();
        if !value.is_finite() {
            return Err(RegistrationError::numerical_instability(
                "mutual information is not finite",
            ));
        }
        Ok(value)
    }
}

impl<B: Backend> Metric<B> for MutualInformation<B> {
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> error::Result<Tensor<B, 1>> {
        let samples = self.sample_fixed(fixed);
        self.forward_samples(&samples, moving, transform)
    }

    fn name(&self) -> &'static str {
        "MutualInformation"
    }
}

fn intensity_range<B: Backend>(data: &Tensor<B, 3>) -> (f64, f64) {
    let min = data.clone().min().into_scalar().elem::<f64>();
    let max = data.clone().max().into_scalar().elem::<f64>();
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;
    use volalign_core::spatial::{Direction, Point, Spacing};
    use volalign_core::transform::{AffineTransform, TransformKind, TransformParameters};

    type B = NdArray<f32>;

    fn blob_image(shape: [usize; 3], center: [f64; 3]) -> Image<B, 3> {
        let device = Default::default();
        let [nz, ny, nx] = shape;
        let mut data = Vec::with_capacity(nz * ny * nx);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let d2 = (x as f64 - center[0]).powi(2)
                        + (y as f64 - center[1]).powi(2)
                        + (z as f64 - center[2]).powi(2);
                    data.push((100.0 * (-d2 / 8.0).exp()) as f32);
                }
            }
        }
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new(shape)), &device);
        Image::new(tensor, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    #[test]
    fn test_identical_images_beat_shifted_images() {
        let device = Default::default();
        let fixed = blob_image([12, 12, 12], [5.5, 5.5, 5.5]);
        let moving = blob_image([12, 12, 12], [7.5, 5.5, 5.5]);
        let metric = MutualInformationConfig::new().init::<B>();
        let samples = metric.sample_fixed(&fixed);
        let identity = AffineTransform::<B, 3>::identity(&device);

        let self_mi = metric.similarity(&samples, &fixed, &identity).unwrap();
        let shifted_mi = metric.similarity(&samples, &moving, &identity).unwrap();
        assert!(self_mi > shifted_mi, "{self_mi} should exceed {shifted_mi}");

        // Following the true shift restores the alignment.
        let center = fixed.world_center();
        let aligned = TransformParameters::new(TransformKind::Translation, vec![2.0, 0.0, 0.0], center)
            .unwrap()
            .to_affine_transform::<B>(&device);
        let aligned_mi = metric.similarity(&samples, &moving, &aligned).unwrap();
        assert!(aligned_mi > shifted_mi);
    }

    #[test]
    fn test_empty_overlap_is_an_error() {
        let device = Default::default();
        let image = blob_image([6, 6, 6], [2.5, 2.5, 2.5]);
        let metric = MutualInformationConfig::new().init::<B>();
        let far = TransformParameters::new(
            TransformKind::Translation,
            vec![1000.0, 0.0, 0.0],
            Point::origin(),
        )
        .unwrap()
        .to_affine_transform::<B>(&device);

        let result = metric.forward(&image, &image, &far);
        assert!(matches!(result, Err(RegistrationError::EmptyOverlap(_))));
    }

    #[test]
    fn test_strided_sampling_uses_subset() {
        let image = blob_image([8, 8, 8], [3.5, 3.5, 3.5]);
        let full = MutualInformationConfig::new().init::<B>().sample_fixed(&image);
        let strided = MutualInformationConfig::new()
            .with_sampling_proportion(Some(0.25))
            .init::<B>()
            .sample_fixed(&image);
        assert_eq!(full.num_samples(), 512);
        assert_eq!(strided.num_samples(), 128);
    }

    #[test]
    fn test_loss_is_negative_mutual_information() {
        let device = Default::default();
        let image = blob_image([8, 8, 8], [3.5, 3.5, 3.5]);
        let metric = MutualInformationConfig::new().init::<B>();
        let identity = AffineTransform::<B, 3>::identity(&device);
        let loss = metric
            .forward(&image, &image, &identity)
            .unwrap()
            .into_scalar()
            .elem::<f64>();
        assert!(loss.is_finite());
        assert!(loss < 0.0);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metric.json");
        let config = MutualInformationConfig::new()
            .with_num_bins(48)
            .with_sampling_proportion(Some(0.5));
        config.save(&path).unwrap();

        let loaded = MutualInformationConfig::load(&path).unwrap();
        assert_eq!(loaded.num_bins, 48);
        assert_eq!(loaded.parzen_sigma, 1.0);
        assert_eq!(loaded.sampling_proportion, Some(0.5));
    }
}
