//! Resolving a [`VolumeInput`] into an [`Image`].

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use ndarray::Array3;
use volalign_core::image::Image;
use crate::array::array_to_tensor;
use crate::error::{LoadError, Result};
use crate::nifti_io::read_nifti_volume;

const LAST_ROW_TOLERANCE: f64 = 1e-6;

/// A volume as handed to the registration pipeline.
#[derive(Debug, Clone)]
pub enum VolumeInput<B: Backend> {
    /// Raw intensities indexed `[i, j, k]`. The affine is required; `None` is
    /// rejected when the input is loaded.
    Array {
        data: Array3<f32>,
        affine: Option<Matrix4<f64>>,
    },
    /// An image that already carries its geometry.
    Image(Image<B, 3>),
    /// A NIfTI-1 file on disk.
    Path(PathBuf),
}

impl<B: Backend> VolumeInput<B> {
    pub fn array(data: Array3<f32>, affine: Matrix4<f64>) -> Self {
        Self::Array { data, affine: Some(affine) }
    }

    pub fn load(self, device: &B::Device) -> Result<Image<B, 3>> {
        load_volume(self, device)
    }
}

impl<B: Backend> From<Image<B, 3>> for VolumeInput<B> {
    fn from(image: Image<B, 3>) -> Self {
        Self::Image(image)
    }
}

impl<B: Backend> From<PathBuf> for VolumeInput<B> {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl<B: Backend> From<&Path> for VolumeInput<B> {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl<B: Backend> From<(Array3<f32>, Matrix4<f64>)> for VolumeInput<B> {
    fn from((data, affine): (Array3<f32>, Matrix4<f64>)) -> Self {
        Self::array(data, affine)
    }
}

/// Turn any accepted input into an image on `device`.
pub fn load_volume<B: Backend>(input: VolumeInput<B>, device: &B::Device) -> Result<Image<B, 3>> {
    match input {
        VolumeInput::Array { data, affine } => {
            let affine = affine.ok_or_else(|| {
                LoadError::invalid_input("raw arrays require an explicit voxel-to-world affine")
            })?;
            from_array(&data, &affine, device)
        }
        VolumeInput::Image(image) => {
            if image.num_voxels() == 0 {
                return Err(LoadError::invalid_input("image has no voxels"));
            }
            Ok(image)
        }
        VolumeInput::Path(path) => from_path(&path, device),
    }
}

fn from_array<B: Backend>(data: &Array3<f32>, affine: &Matrix4<f64>, device: &B::Device) -> Result<Image<B, 3>> {
    if data.is_empty() {
        return Err(LoadError::invalid_input(format!(
            "volume has a zero-sized dimension: {:?}",
            data.shape()
        )));
    }
    check_affine(affine)?;
    Image::from_affine(array_to_tensor::<B>(data, device), affine)
        .ok_or_else(|| LoadError::invalid_input("affine is not invertible"))
}

fn from_path<B: Backend>(path: &Path, device: &B::Device) -> Result<Image<B, 3>> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }
    let (data, affine) = read_nifti_volume(path).map_err(|e| LoadError::unreadable(path, format!("{e:#}")))?;
    tracing::debug!(path = %path.display(), shape = ?data.shape(), "loaded volume");
    from_array(&data, &affine, device)
}

fn check_affine(affine: &Matrix4<f64>) -> Result<()> {
    if affine.iter().any(|v| !v.is_finite()) {
        return Err(LoadError::invalid_input("affine contains non-finite entries"));
    }
    let expected = [0.0, 0.0, 0.0, 1.0];
    let row_ok = (0..4).all(|c| (affine[(3, c)] - expected[c]).abs() <= LAST_ROW_TOLERANCE);
    if !row_ok {
        return Err(LoadError::invalid_input(format!(
            "affine last row must be [0, 0, 0, 1], found {:?}",
            [affine[(3, 0)], affine[(3, 1)], affine[(3, 2)], affine[(3, 3)]]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn cube(n: usize) -> Array3<f32> {
        Array3::from_shape_fn((n, n, n), |(i, j, k)| (i + j + k) as f32)
    }

    #[test]
    fn test_array_without_affine_is_rejected() {
        let device = Default::default();
        let input = VolumeInput::<TestBackend>::Array { data: cube(3), affine: None };
        assert!(matches!(load_volume(input, &device), Err(LoadError::InvalidInput(_))));
    }

    #[test]
    fn test_singular_affine_is_rejected() {
        let device = Default::default();
        let mut affine = Matrix4::identity();
        affine[(2, 2)] = 0.0;
        let result = load_volume(VolumeInput::<TestBackend>::array(cube(3), affine), &device);
        assert!(matches!(result, Err(LoadError::InvalidInput(_))));
    }

    #[test]
    fn test_bad_last_row_is_rejected() {
        let device = Default::default();
        let mut affine = Matrix4::identity();
        affine[(3, 0)] = 0.5;
        let result = load_volume(VolumeInput::<TestBackend>::array(cube(3), affine), &device);
        assert!(matches!(result, Err(LoadError::InvalidInput(_))));
    }

    #[test]
    fn test_non_finite_affine_is_rejected() {
        let device = Default::default();
        let mut affine = Matrix4::identity();
        affine[(0, 3)] = f64::NAN;
        let result = load_volume(VolumeInput::<TestBackend>::array(cube(3), affine), &device);
        assert!(matches!(result, Err(LoadError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_array_is_rejected() {
        let device = Default::default();
        let data = Array3::<f32>::zeros((0, 4, 4));
        let result = load_volume(VolumeInput::<TestBackend>::array(data, Matrix4::identity()), &device);
        assert!(matches!(result, Err(LoadError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_file() {
        let device = Default::default();
        let input = VolumeInput::<TestBackend>::from(Path::new("/nonexistent/volume.nii"));
        assert!(matches!(load_volume(input, &device), Err(LoadError::FileNotFound(_))));
    }

    #[test]
    fn test_array_geometry() {
        let device = Default::default();
        let mut affine = Matrix4::identity() * 2.0;
        affine[(3, 3)] = 1.0;
        affine[(0, 3)] = -10.0;
        let image = load_volume(VolumeInput::<TestBackend>::array(cube(4), affine), &device).unwrap();
        assert_eq!(image.shape(), [4, 4, 4]);
        assert_eq!(image.spacing()[0], 2.0);
        assert_eq!(image.origin()[0], -10.0);
    }
}
