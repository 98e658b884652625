//! Similarity metrics.

pub mod trait_;
pub mod histogram;
pub mod mutual_information;

pub use trait_::Metric;
pub use histogram::ParzenJointHistogram;
pub use mutual_information::{FixedSamples, MutualInformation, MutualInformationConfig};
