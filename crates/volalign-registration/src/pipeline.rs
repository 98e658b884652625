//! The staged registration pipeline.
//!
//! Stages run in the order center of mass, translation, rigid, affine (any
//! subsequence). Each iterative stage is seeded with the previous stage's
//! transform, widened with identity values for its new degrees of freedom,
//! and optimized coarse to fine over a shared pyramid. After every stage the
//! seed and the stage result are scored at the finest level; a result that
//! scores worse is discarded.

use std::sync::Arc;
use burn::tensor::backend::{AutodiffBackend, Backend};
use nalgebra::Matrix4;
use ndarray::Array3;
use volalign_core::filter::ResampleImageFilter;
use volalign_core::image::Image;
use volalign_core::interpolation::LinearInterpolator;
use volalign_core::transform::{AffineTransform, TransformKind, TransformParameters};
use volalign_io::{tensor_to_array, VolumeInput};
use crate::center_of_mass::center_of_mass_alignment;
use crate::config::{RegistrationConfig, StageKind};
use crate::error::{RegistrationError, Result};
use crate::metric::{FixedSamples, MutualInformation};
use crate::multires::{build_levels, MultiResolutionRegistration};
use crate::progress::{RegistrationEvent, RegistrationObserver, TracingObserver};
use crate::report::StageReport;

/// Result of a registration run.
#[derive(Debug, Clone)]
pub struct RegistrationOutput {
    /// Moving volume resampled onto the fixed grid, indexed `[i, j, k]`.
    pub transformed: Array3<f32>,
    /// Homogeneous map from fixed world coordinates to moving world coordinates.
    pub affine: Matrix4<f64>,
    /// Final parameters (family of the last stage that ran).
    pub parameters: TransformParameters,
    pub stages: Vec<StageReport>,
}

/// Configurable registration pipeline.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use burn::backend::Autodiff;
/// use burn_ndarray::NdArray;
/// use volalign_registration::{AffineRegistration, RegistrationConfig, HistoryObserver};
/// use volalign_io::VolumeInput;
///
/// type B = Autodiff<NdArray<f32>>;
///
/// let history = HistoryObserver::new();
/// let registration = AffineRegistration::new(RegistrationConfig::new())
///     .with_observer(Arc::new(history.clone()));
/// let device = Default::default();
/// let output = registration
///     .execute::<B>(
///         VolumeInput::Path("moving.nii.gz".into()),
///         VolumeInput::Path("fixed.nii.gz".into()),
///         &device,
///     )
///     .unwrap();
/// println!("{}", output.affine);
/// ```
#[derive(Clone)]
pub struct AffineRegistration {
    config: RegistrationConfig,
    observer: Arc<dyn RegistrationObserver>,
    default_value: f64,
}

impl AffineRegistration {
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingObserver::default()),
            default_value: 0.0,
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Intensity for output voxels that map outside the moving volume.
    pub fn with_default_value(mut self, value: f64) -> Self {
        self.default_value = value;
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Load both volumes, estimate the transform and resample `moving` onto
    /// the `fixed` grid.
    pub fn execute<B: AutodiffBackend>(
        &self,
        moving: VolumeInput<B>,
        fixed: VolumeInput<B>,
        device: &B::Device,
    ) -> Result<RegistrationOutput> {
        self.config.validate()?;
        let fixed = fixed.load(device)?;
        let moving = moving.load(device)?;
        tracing::debug!(fixed = ?fixed.shape(), moving = ?moving.shape(), "volumes loaded");

        let (parameters, stages) = self.estimate(&fixed, &moving)?;
        let affine = parameters.matrix();
        let transformed = self.resample(&fixed, &moving, &affine)?;

        Ok(RegistrationOutput {
            transformed,
            affine,
            parameters,
            stages,
        })
    }

    /// Run the configured stages on loaded images.
    pub fn estimate<B: AutodiffBackend>(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
    ) -> Result<(TransformParameters, Vec<StageReport>)> {
        self.config.validate()?;
        let observer = self.observer.as_ref();
        let metric = self.config.metric.init::<B>();
        let optimizer = self.config.optimizer.init();
        let center = fixed.world_center();

        let iterative = self.config.stages.iter().any(StageKind::is_iterative);
        let levels = if iterative {
            build_levels(fixed, moving, &self.config.schedule, &metric)
        } else {
            Vec::new()
        };
        let scorer = match levels.last() {
            Some(level) => Scorer::new(&metric, level.samples.clone(), level.moving.clone()),
            None => Scorer::new(&metric, metric.sample_fixed(fixed), moving.clone()),
        };
        let driver = MultiResolutionRegistration::new(&metric, &optimizer, observer);

        let mut current = TransformParameters::identity(TransformKind::Translation, center);
        let mut reports = Vec::with_capacity(self.config.stages.len());

        for &stage in &self.config.stages {
            let seed = current.widen(stage.transform_kind()).ok_or_else(|| {
                RegistrationError::configuration(format!(
                    "stage {stage} cannot follow a {:?} transform",
                    current.kind()
                ))
            })?;
            observer.on_event(&RegistrationEvent::StageStarted {
                stage,
                parameters: seed.values().to_vec(),
            });

            let (candidate, levels_run) = match stage {
                StageKind::CenterOfMass => (center_of_mass_alignment(fixed, moving, center), Vec::new()),
                _ => driver.execute(stage, &levels, seed.clone())?,
            };

            let before = scorer.score(&seed);
            let after = scorer.score(&candidate);
            let worse = !candidate.is_nonsingular()
                || match (before, after) {
                    (Some(before), Some(after)) => after < before,
                    (Some(_), None) => true,
                    (None, _) => false,
                };

            let (output, similarity_after) = if worse {
                observer.on_event(&RegistrationEvent::StageReverted {
                    stage,
                    similarity_before: before,
                    similarity_after: after,
                });
                (seed, before)
            } else {
                (candidate, after)
            };

            observer.on_event(&RegistrationEvent::StageFinished {
                stage,
                similarity: similarity_after,
                parameters: output.values().to_vec(),
            });
            reports.push(StageReport {
                stage,
                similarity_before: before,
                similarity_after,
                reverted: worse,
                parameters: output.values().to_vec(),
                levels: levels_run,
            });
            current = output;
        }

        Ok((current, reports))
    }

    fn resample<B: Backend>(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        affine: &Matrix4<f64>,
    ) -> Result<Array3<f32>> {
        let device = moving.data().device();
        let transform = AffineTransform::<B, 3>::from_homogeneous(affine, &device);
        let resampled = ResampleImageFilter::new_from_reference(fixed, transform, LinearInterpolator::new())
            .with_default_pixel_value(self.default_value)
            .apply(moving);
        tensor_to_array(resampled.data()).map_err(RegistrationError::backend)
    }
}

/// Register `moving` to `fixed` with `config`, logging through `tracing`.
///
/// The returned affine maps fixed world coordinates to moving world
/// coordinates; `transformed` lies on the fixed grid.
pub fn register<B: AutodiffBackend>(
    moving: VolumeInput<B>,
    fixed: VolumeInput<B>,
    config: &RegistrationConfig,
    device: &B::Device,
) -> Result<RegistrationOutput> {
    AffineRegistration::new(config.clone()).execute(moving, fixed, device)
}

/// Mutual information at the scoring level; `None` when it cannot be evaluated.
struct Scorer<'a, B: Backend> {
    metric: &'a MutualInformation<B>,
    samples: FixedSamples<B>,
    moving: Image<B, 3>,
}

impl<'a, B: Backend> Scorer<'a, B> {
    fn new(metric: &'a MutualInformation<B>, samples: FixedSamples<B>, moving: Image<B, 3>) -> Self {
        Self { metric, samples, moving }
    }

    fn score(&self, parameters: &TransformParameters) -> Option<f64> {
        let device = self.moving.data().device();
        let transform = parameters.to_affine_transform::<B>(&device);
        self.metric.similarity(&self.samples, &self.moving, &transform).ok()
    }
}
