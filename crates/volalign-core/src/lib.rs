//! Core volume types for volalign.
//!
//! Volumes are burn tensors laid out `[Z, Y, X]` together with the physical
//! metadata (origin, spacing, direction) that maps voxel indices into world
//! space. Index tuples are always written `(x, y, z)`.

pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use image::Image;
pub use spatial::{Point, Vector, Spacing, Direction};
