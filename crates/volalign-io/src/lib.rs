//! Volume loading for volalign.
//!
//! Three input shapes are accepted (see [`VolumeInput`]): a raw array with an
//! explicit affine, an already-built [`Image`](volalign_core::Image), or a
//! path to a NIfTI-1 file.

pub mod error;
pub mod array;
pub mod nifti_io;
pub mod loader;

pub use error::{LoadError, Result};
pub use array::{array_to_tensor, tensor_to_array};
pub use nifti_io::{read_nifti, read_nifti_volume, write_nifti, write_nifti_volume};
pub use loader::{load_volume, VolumeInput};
