//! Registration objective for one pyramid level.
//!
//! The optimizer works on scaled offsets `y` from the level seed:
//! `p = seed + y ⊙ scales`. Translations are scaled by the level's mean
//! spacing and the dimensionless parameters by `spacing / half_diagonal`, so
//! a unit step in any coordinate moves voxels by about one level voxel.

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use nalgebra::DVector;
use volalign_core::image::Image;
use volalign_core::transform::{TransformKind, TransformParameters};
use crate::error::{RegistrationError, Result};
use crate::metric::{FixedSamples, MutualInformation};
use crate::optimizer::Objective;

/// Per-parameter scale for `kind` on a level grid.
pub fn parameter_scales<B: burn::tensor::backend::Backend>(
    kind: TransformKind,
    level: &Image<B, 3>,
) -> DVector<f64> {
    let spacing = level.spacing().mean_spacing();
    let radius = level.half_diagonal().max(spacing);
    let dimensionless = spacing / radius;
    DVector::from_fn(kind.num_parameters(), |i, _| if i < 3 { spacing } else { dimensionless })
}

/// `-MI` and its gradient in scaled parameter space.
pub struct LevelObjective<'a, B: AutodiffBackend> {
    metric: &'a MutualInformation<B>,
    samples: &'a FixedSamples<B>,
    moving: &'a Image<B, 3>,
    seed: TransformParameters,
    scales: DVector<f64>,
    center: Tensor<B, 1>,
    device: B::Device,
}

impl<'a, B: AutodiffBackend> LevelObjective<'a, B> {
    /// # Arguments
    /// * `fixed` - Fixed image of this level, used for parameter scaling
    /// * `samples` - Fixed samples of the same level
    /// * `moving` - Moving image of this level
    /// * `seed` - Parameters at `y = 0`
    pub fn new(
        metric: &'a MutualInformation<B>,
        fixed: &Image<B, 3>,
        samples: &'a FixedSamples<B>,
        moving: &'a Image<B, 3>,
        seed: TransformParameters,
    ) -> Self {
        let device = moving.data().device();
        let scales = parameter_scales(seed.kind(), fixed);
        let center = seed.center_tensor::<B>(&device);
        Self {
            metric,
            samples,
            moving,
            seed,
            scales,
            center,
            device,
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.scales.len()
    }

    pub fn scales(&self) -> &DVector<f64> {
        &self.scales
    }

    /// Parameters at scaled offset `y`.
    pub fn parameters(&self, y: &DVector<f64>) -> Result<TransformParameters> {
        let values = self
            .seed
            .values()
            .iter()
            .zip(y.iter().zip(self.scales.iter()))
            .map(|(p, (y, s))| p + y * s)
            .collect::<Vec<_>>();
        self.seed.with_values(values).ok_or_else(|| {
            RegistrationError::invalid_input(format!(
                "expected {} parameters, got {}",
                self.num_parameters(),
                y.len()
            ))
        })
    }
}

impl<B: AutodiffBackend> Objective for LevelObjective<'_, B> {
    fn evaluate(&mut self, y: &DVector<f64>) -> Result<(f64, DVector<f64>)> {
        let params = self.parameters(y)?;
        if !params.is_nonsingular() {
            return Err(RegistrationError::singular_transform(format!(
                "det(L) = {:.3e} at {:?}",
                params.linear_matrix().determinant(),
                params.values()
            )));
        }

        let tensor = params.to_tensor::<B>(&self.device).require_grad();
        let transform = params.kind().compose(tensor.clone(), self.center.clone());
        let loss = self.metric.forward_samples(self.samples, self.moving, &transform)?;
        let value = loss.clone().into_scalar().elem::<f64>();
        if !value.is_finite() {
            return Err(RegistrationError::numerical_instability(format!(
                "loss is {value} at {:?}",
                params.values()
            )));
        }

        let grads = loss.backward();
        // No gradient means the loss is flat in the parameters, e.g. a constant moving level.
        let grad: Vec<f32> = match tensor.grad(&grads) {
            Some(grad) => grad
                .into_data()
                .convert::<f32>()
                .to_vec()
                .map_err(|e| RegistrationError::backend(format!("{e:?}")))?,
            None => vec![0.0; self.scales.len()],
        };

        let gradient = DVector::from_iterator(
            grad.len(),
            grad.iter().zip(self.scales.iter()).map(|(&g, s)| g as f64 * s),
        );
        if gradient.iter().any(|g| !g.is_finite()) {
            return Err(RegistrationError::numerical_instability("gradient is not finite"));
        }
        Ok((value, gradient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;
    use volalign_core::spatial::{Direction, Point, Spacing};
    use crate::metric::MutualInformationConfig;

    type B = Autodiff<NdArray<f32>>;

    fn blob(shape: [usize; 3], center: [f64; 3], spacing: f64) -> Image<B, 3> {
        let device = Default::default();
        let [nz, ny, nx] = shape;
        let data: Vec<f32> = (0..nz * ny * nx)
            .map(|i| {
                let (x, y, z) = (i % nx, (i / nx) % ny, i / (nx * ny));
                let d2 = (x as f64 - center[0]).powi(2)
                    + (y as f64 - center[1]).powi(2)
                    + (z as f64 - center[2]).powi(2);
                (50.0 * (-d2 / 6.0).exp()) as f32
            })
            .collect();
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new(shape)), &device);
        Image::new(tensor, Point::origin(), Spacing::uniform(spacing), Direction::identity())
    }

    #[test]
    fn test_scales() {
        let image = blob([5, 5, 5], [2.0, 2.0, 2.0], 2.0);
        let scales = parameter_scales(TransformKind::Rigid, &image);
        assert_eq!(scales.len(), 6);
        assert_eq!(scales[0], 2.0);
        // half diagonal = sqrt(3) * 8 / 2
        let expected = 2.0 / (3.0f64.sqrt() * 4.0);
        assert!((scales[3] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_points_towards_alignment() {
        let fixed = blob([12, 12, 12], [5.5, 5.5, 5.5], 1.0);
        let moving = blob([12, 12, 12], [7.0, 5.5, 5.5], 1.0);
        let metric = MutualInformationConfig::new().init::<B>();
        let samples = metric.sample_fixed(&fixed);
        let seed = TransformParameters::identity(TransformKind::Translation, fixed.world_center());

        let mut objective = LevelObjective::new(&metric, &fixed, &samples, &moving, seed);
        let (value, gradient) = objective.evaluate(&DVector::zeros(3)).unwrap();
        assert!(value.is_finite());
        // Increasing tx reduces the loss.
        assert!(gradient[0] < 0.0, "gradient {gradient:?}");
    }

    #[test]
    fn test_singular_parameters_are_rejected() {
        let image = blob([6, 6, 6], [2.5, 2.5, 2.5], 1.0);
        let metric = MutualInformationConfig::new().init::<B>();
        let samples = metric.sample_fixed(&image);
        let seed = TransformParameters::identity(TransformKind::Affine, image.world_center());
        let mut objective = LevelObjective::new(&metric, &image, &samples, &image, seed);

        let mut y = DVector::zeros(12);
        // Drive sx to zero
        y[6] = -1.0 / objective.scales()[6];
        assert!(matches!(
            objective.evaluate(&y),
            Err(RegistrationError::SingularTransform(_))
        ));
    }

    #[test]
    fn test_constant_moving_level_has_flat_gradient() {
        let fixed = blob([8, 8, 8], [3.5, 3.5, 3.5], 1.0);
        let device = Default::default();
        let moving: Image<B, 3> = Image::new(
            Tensor::full([8, 8, 8], 5.0, &device),
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        );
        let metric = MutualInformationConfig::new().init::<B>();
        let samples = metric.sample_fixed(&fixed);
        let seed = TransformParameters::identity(TransformKind::Rigid, fixed.world_center());
        let mut objective = LevelObjective::new(&metric, &fixed, &samples, &moving, seed);

        let (value, gradient) = objective.evaluate(&DVector::zeros(6)).unwrap();
        assert!(value.is_finite());
        assert_eq!(gradient.len(), 6);
        assert!(gradient.iter().all(|g| *g == 0.0), "gradient {gradient:?}");
    }
}
