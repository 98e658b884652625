//! Spatial transforms.
//!
//! Tensor transforms ([`AffineTransform`]) are what the metric and resampler
//! evaluate; [`TransformParameters`] is the host-side parameter vector of one
//! of the registration families and knows how to build either form.

pub mod trait_;
pub mod affine;
pub mod rotation;
pub mod parametric;
pub mod decompose;

pub use trait_::Transform;
pub use affine::AffineTransform;
pub use parametric::{TransformKind, TransformParameters};
pub use decompose::{decompose_affine, AffineDecomposition};
