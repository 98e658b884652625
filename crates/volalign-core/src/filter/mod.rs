//! Image filters: smoothing, subsampling, pyramids and resampling.

pub mod gaussian;
pub mod downsample;
pub mod pyramid;
pub mod resample;

pub use gaussian::GaussianFilter;
pub use downsample::DownsampleFilter;
pub use pyramid::MultiResolutionPyramid;
pub use resample::ResampleImageFilter;
