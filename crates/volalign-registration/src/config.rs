//! Pipeline configuration.
//!
//! All structs derive burn's `Config`, so they serialize to JSON with
//! `save`/`load` and print as JSON through `Display`.

use std::fmt;
use std::str::FromStr;
use burn::config::Config;
use serde::{Deserialize, Serialize};
use volalign_core::transform::TransformKind;
use crate::error::{self, RegistrationError};
use crate::metric::MutualInformationConfig;
use crate::optimizer::LbfgsConfig;
use crate::validation;

/// One step of the staged pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Closed-form translation aligning intensity-weighted centroids.
    CenterOfMass,
    Translation,
    Rigid,
    Affine,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::CenterOfMass,
        StageKind::Translation,
        StageKind::Rigid,
        StageKind::Affine,
    ];

    /// Parameter family the stage produces.
    pub fn transform_kind(&self) -> TransformKind {
        match self {
            StageKind::CenterOfMass | StageKind::Translation => TransformKind::Translation,
            StageKind::Rigid => TransformKind::Rigid,
            StageKind::Affine => TransformKind::Affine,
        }
    }

    /// Whether the stage runs the optimizer over the pyramid.
    pub fn is_iterative(&self) -> bool {
        !matches!(self, StageKind::CenterOfMass)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::CenterOfMass => "center_of_mass",
            StageKind::Translation => "translation",
            StageKind::Rigid => "rigid",
            StageKind::Affine => "affine",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> error::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "center_of_mass" | "com" => Ok(StageKind::CenterOfMass),
            "translation" => Ok(StageKind::Translation),
            "rigid" => Ok(StageKind::Rigid),
            "affine" => Ok(StageKind::Affine),
            other => Err(RegistrationError::configuration(format!(
                "unknown stage '{other}' (expected center_of_mass, translation, rigid or affine)"
            ))),
        }
    }
}

/// Pyramid schedule shared by every iterative stage.
///
/// The three sequences are parallel, coarsest level first, and are used as
/// given: no finest level is appended.
#[derive(Config, Debug)]
pub struct RegistrationSchedule {
    /// Optimizer iteration budget per level. A zero budget skips the level.
    #[config(default = "vec![10000, 1000, 100]")]
    pub level_iters: Vec<usize>,
    /// Gaussian smoothing per level, in voxels of the full-resolution volume.
    #[config(default = "vec![3.0, 1.0, 0.0]")]
    pub sigmas: Vec<f64>,
    /// Integer subsampling factor per level.
    #[config(default = "vec![4, 2, 1]")]
    pub factors: Vec<usize>,
}

impl RegistrationSchedule {
    pub fn levels(&self) -> usize {
        self.level_iters.len()
    }
}

#[derive(Config, Debug)]
pub struct RegistrationConfig {
    /// Stages to run, a subsequence of [`StageKind::ALL`].
    #[config(default = "StageKind::ALL.to_vec()")]
    pub stages: Vec<StageKind>,
    #[config(default = "RegistrationSchedule::new()")]
    pub schedule: RegistrationSchedule,
    #[config(default = "MutualInformationConfig::new()")]
    pub metric: MutualInformationConfig,
    #[config(default = "LbfgsConfig::new()")]
    pub optimizer: LbfgsConfig,
}

impl RegistrationConfig {
    /// Reject inconsistent settings before any volume is touched.
    pub fn validate(&self) -> error::Result<()> {
        validation::validate_stages(&self.stages)?;
        let needs_levels = self.stages.iter().any(StageKind::is_iterative);
        validation::validate_schedule(&self.schedule, needs_levels)?;
        validation::validate_histogram_params(self.metric.num_bins, self.metric.parzen_sigma)?;
        if let Some(proportion) = self.metric.sampling_proportion {
            validation::validate_sampling_proportion(proportion)?;
        }
        validation::validate_lbfgs(&self.optimizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parsing() {
        assert_eq!("com".parse::<StageKind>().unwrap(), StageKind::CenterOfMass);
        assert_eq!("Center-Of-Mass".parse::<StageKind>().unwrap(), StageKind::CenterOfMass);
        assert_eq!(" rigid ".parse::<StageKind>().unwrap(), StageKind::Rigid);
        assert!(matches!(
            "bspline".parse::<StageKind>(),
            Err(RegistrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_stage_display_roundtrips() {
        for stage in StageKind::ALL {
            assert_eq!(stage.to_string().parse::<StageKind>().unwrap(), stage);
        }
    }

    #[test]
    fn test_defaults() {
        let config = RegistrationConfig::new();
        assert_eq!(config.stages, StageKind::ALL.to_vec());
        assert_eq!(config.schedule.level_iters, vec![10000, 1000, 100]);
        assert_eq!(config.schedule.sigmas, vec![3.0, 1.0, 0.0]);
        assert_eq!(config.schedule.factors, vec![4, 2, 1]);
        assert_eq!(config.metric.num_bins, 32);
        assert_eq!(config.optimizer.history_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mismatched_schedule_is_rejected() {
        let config = RegistrationConfig::new().with_schedule(
            RegistrationSchedule::new()
                .with_level_iters(vec![5, 5])
                .with_sigmas(vec![3.0, 1.0, 0.0])
                .with_factors(vec![4, 2]),
        );
        assert!(matches!(config.validate(), Err(RegistrationError::Configuration(_))));
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let config = RegistrationConfig::new().with_stages(vec![StageKind::Rigid, StageKind::Translation]);
        assert!(matches!(config.validate(), Err(RegistrationError::Configuration(_))));

        let config = RegistrationConfig::new().with_stages(vec![StageKind::Rigid, StageKind::Rigid]);
        assert!(config.validate().is_err());

        let config = RegistrationConfig::new().with_stages(vec![StageKind::CenterOfMass, StageKind::Affine]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = RegistrationConfig::new()
            .with_stages(vec![StageKind::Translation, StageKind::Rigid])
            .with_metric(MutualInformationConfig::new().with_sampling_proportion(Some(0.25)));
        config.save(&path).unwrap();

        let loaded = RegistrationConfig::load(&path).unwrap();
        assert_eq!(loaded.stages, config.stages);
        assert_eq!(loaded.metric.sampling_proportion, Some(0.25));
        assert_eq!(loaded.schedule.factors, config.schedule.factors);
    }
}
