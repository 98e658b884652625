//! Volumes with physical metadata.

pub mod image;
pub mod grid;

pub use image::Image;
pub use grid::{voxel_grid, strided_voxel_grid};
