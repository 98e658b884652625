//! Coarse-to-fine execution of one iterative stage.

use burn::tensor::backend::{AutodiffBackend, Backend};
use nalgebra::DVector;
use volalign_core::filter::MultiResolutionPyramid;
use volalign_core::image::Image;
use volalign_core::transform::TransformParameters;
use crate::config::{RegistrationSchedule, StageKind};
use crate::error::{RegistrationError, Result};
use crate::metric::{FixedSamples, MutualInformation};
use crate::objective::LevelObjective;
use crate::optimizer::{OptimizationStatus, Optimizer};
use crate::progress::{RegistrationEvent, RegistrationObserver};
use crate::report::{LevelOutcome, LevelReport};

/// Fixed and moving volumes of one pyramid level, with the fixed samples
/// the metric needs.
#[derive(Debug, Clone)]
pub struct PyramidLevel<B: Backend> {
    pub fixed: Image<B, 3>,
    pub moving: Image<B, 3>,
    pub samples: FixedSamples<B>,
    pub max_iterations: usize,
}

/// Build every level of `schedule`, coarsest first.
pub fn build_levels<B: Backend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    schedule: &RegistrationSchedule,
    metric: &MutualInformation<B>,
) -> Vec<PyramidLevel<B>> {
    let fixed_pyramid = MultiResolutionPyramid::new(fixed, &schedule.sigmas, &schedule.factors);
    let moving_pyramid = MultiResolutionPyramid::new(moving, &schedule.sigmas, &schedule.factors);

    fixed_pyramid
        .iter()
        .zip(moving_pyramid.iter())
        .zip(&schedule.level_iters)
        .map(|((fixed, moving), &max_iterations)| PyramidLevel {
            samples: metric.sample_fixed(fixed),
            fixed: fixed.clone(),
            moving: moving.clone(),
            max_iterations,
        })
        .collect()
}

/// Multi-resolution driver.
///
/// Each level starts from the previous level's result; the first level
/// starts from the stage seed.
pub struct MultiResolutionRegistration<'a, B: AutodiffBackend> {
    metric: &'a MutualInformation<B>,
    optimizer: &'a dyn Optimizer,
    observer: &'a dyn RegistrationObserver,
}

impl<'a, B: AutodiffBackend> MultiResolutionRegistration<'a, B> {
    pub fn new(
        metric: &'a MutualInformation<B>,
        optimizer: &'a dyn Optimizer,
        observer: &'a dyn RegistrationObserver,
    ) -> Self {
        Self {
            metric,
            optimizer,
            observer,
        }
    }

    /// Run `stage` over `levels` from `seed`.
    ///
    /// A level with a zero budget, or whose seed has no overlap, is skipped
    /// with an event. Any other evaluation failure at a level seed is
    /// returned.
    pub fn execute(
        &self,
        stage: StageKind,
        levels: &[PyramidLevel<B>],
        seed: TransformParameters,
    ) -> Result<(TransformParameters, Vec<LevelReport>)> {
        let mut current = seed;
        let mut reports = Vec::with_capacity(levels.len());

        for (index, level) in levels.iter().enumerate() {
            if level.max_iterations == 0 {
                self.skip(stage, index, "zero iteration budget", &mut reports);
                continue;
            }

            self.observer.on_event(&RegistrationEvent::LevelStarted {
                stage,
                level: index,
                levels: levels.len(),
                shape: level.fixed.shape(),
                max_iterations: level.max_iterations,
            });

            let mut objective =
                LevelObjective::new(self.metric, &level.fixed, &level.samples, &level.moving, current.clone());
            let observer = self.observer;
            let mut callback = |info: &crate::optimizer::IterationInfo| {
                observer.on_event(&RegistrationEvent::Iteration {
                    stage,
                    level: index,
                    iteration: info.iteration,
                    similarity: -info.value,
                    step_length: info.step_length,
                });
            };

            let x0 = DVector::zeros(objective.num_parameters());
            let result = match self.optimizer.minimize(&mut objective, x0, level.max_iterations, &mut callback) {
                Ok(result) => result,
                Err(RegistrationError::EmptyOverlap(reason)) => {
                    self.skip(stage, index, &format!("no overlap at the level seed: {reason}"), &mut reports);
                    continue;
                }
                Err(err) => {
                    self.skip(stage, index, &format!("level seed cannot be evaluated: {err}"), &mut reports);
                    continue;
                }
            };

            current = objective.parameters(&result.parameters)?;
            if result.status == OptimizationStatus::Exhausted {
                self.observer.on_event(&RegistrationEvent::ConvergenceWarning {
                    stage,
                    level: index,
                    iterations: result.iterations,
                });
            }
            self.observer.on_event(&RegistrationEvent::LevelFinished {
                stage,
                level: index,
                iterations: result.iterations,
                similarity: -result.value,
                status: result.status,
            });
            reports.push(LevelReport {
                level: index,
                iterations: result.iterations,
                similarity: Some(-result.value),
                outcome: result.status.into(),
            });
        }

        Ok((current, reports))
    }

    fn skip(&self, stage: StageKind, level: usize, reason: &str, reports: &mut Vec<LevelReport>) {
        self.observer.on_event(&RegistrationEvent::LevelSkipped {
            stage,
            level,
            reason: reason.to_string(),
        });
        reports.push(LevelReport {
            level,
            iterations: 0,
            similarity: None,
            outcome: LevelOutcome::Skipped,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::{Shape, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use volalign_core::spatial::{Direction, Point, Spacing};
    use volalign_core::transform::TransformKind;
    use crate::metric::MutualInformationConfig;
    use crate::optimizer::LbfgsConfig;
    use crate::progress::HistoryObserver;

    type B = Autodiff<NdArray<f32>>;

    fn ramp(n: usize) -> Image<B, 3> {
        let device = Default::default();
        let data: Vec<f32> = (0..n * n * n).map(|i| ((i % n) + (i / n) % n) as f32).collect();
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new([n, n, n])), &device);
        Image::new(tensor, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    #[test]
    fn test_levels_follow_schedule() {
        let image = ramp(8);
        let metric = MutualInformationConfig::new().init::<B>();
        let schedule = RegistrationSchedule::new()
            .with_level_iters(vec![3, 0])
            .with_sigmas(vec![1.0, 0.0])
            .with_factors(vec![2, 1]);
        let levels = build_levels(&image, &image, &schedule, &metric);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].fixed.shape(), [4, 4, 4]);
        assert_eq!(levels[1].fixed.shape(), [8, 8, 8]);
        assert_eq!(levels[1].max_iterations, 0);
    }

    #[test]
    fn test_zero_budget_level_is_skipped() {
        let image = ramp(8);
        let metric = MutualInformationConfig::new().init::<B>();
        let optimizer = LbfgsConfig::new().init();
        let observer = HistoryObserver::new();
        let schedule = RegistrationSchedule::new()
            .with_level_iters(vec![2, 0])
            .with_sigmas(vec![1.0, 0.0])
            .with_factors(vec![2, 1]);
        let levels = build_levels(&image, &image, &schedule, &metric);
        let seed = TransformParameters::identity(TransformKind::Translation, image.world_center());

        let driver = MultiResolutionRegistration::new(&metric, &optimizer, &observer);
        let (result, reports) = driver.execute(StageKind::Translation, &levels, seed).unwrap();

        assert_eq!(reports.len(), 2);
        assert_ne!(reports[0].outcome, LevelOutcome::Skipped);
        assert_eq!(reports[1].outcome, LevelOutcome::Skipped);
        assert!(result.is_nonsingular());
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, RegistrationEvent::LevelSkipped { level: 1, .. })));
    }

    #[test]
    fn test_no_overlap_at_seed_skips_level() {
        let image = ramp(6);
        let metric = MutualInformationConfig::new().init::<B>();
        let optimizer = LbfgsConfig::new().init();
        let observer = HistoryObserver::new();
        let schedule = RegistrationSchedule::new()
            .with_level_iters(vec![5])
            .with_sigmas(vec![0.0])
            .with_factors(vec![1]);
        let levels = build_levels(&image, &image, &schedule, &metric);
        let seed = TransformParameters::new(
            TransformKind::Translation,
            vec![500.0, 0.0, 0.0],
            image.world_center(),
        )
        .unwrap();

        let driver = MultiResolutionRegistration::new(&metric, &optimizer, &observer);
        let (result, reports) = driver.execute(StageKind::Translation, &levels, seed.clone()).unwrap();
        assert_eq!(result, seed);
        assert_eq!(reports[0].outcome, LevelOutcome::Skipped);
    }
}
