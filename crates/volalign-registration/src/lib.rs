//! Staged, multi-resolution affine registration of 3-D volumes.
//!
//! [`register`] aligns a moving volume to a fixed one through a sequence of
//! stages (center of mass, translation, rigid, affine), each optimizing
//! Parzen-window mutual information with L-BFGS over a Gaussian pyramid.
//! [`AffineRegistration`] is the configurable form that accepts a custom
//! [`RegistrationObserver`].

pub mod error;
pub mod config;
pub mod validation;
pub mod progress;
pub mod metric;
pub mod optimizer;
pub mod objective;
pub mod center_of_mass;
pub mod multires;
pub mod report;
pub mod pipeline;

pub use error::{RegistrationError, Result};
pub use config::{RegistrationConfig, RegistrationSchedule, StageKind};
pub use metric::{Metric, MutualInformation, MutualInformationConfig};
pub use optimizer::{Lbfgs, LbfgsConfig, OptimizationStatus};
pub use progress::{HistoryObserver, NullObserver, RegistrationEvent, RegistrationObserver, TracingObserver};
pub use report::{LevelOutcome, LevelReport, StageReport};
pub use pipeline::{register, AffineRegistration, RegistrationOutput};
pub use validation::ConvergenceChecker;

pub use volalign_core::transform::{decompose_affine, AffineDecomposition, TransformKind, TransformParameters};
pub use volalign_io::VolumeInput;
