use std::path::Path;
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use volalign_core::image::Image;
use crate::array::{array_to_tensor, tensor_to_array};

/// Read a NIfTI-1 file as an `[i, j, k]` array and its voxel-to-world affine.
///
/// The affine comes from the sform when present, else the qform, else the
/// voxel sizes alone. Trailing singleton dimensions (e.g. a one-volume 4-D
/// file) are dropped.
pub fn read_nifti_volume<P: AsRef<Path>>(path: P) -> Result<(Array3<f32>, Matrix4<f64>)> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let mut volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    while volume.ndim() > 3 && volume.shape()[volume.ndim() - 1] == 1 {
        let last = volume.ndim() - 1;
        volume = volume.index_axis_move(Axis(last), 0);
    }
    if volume.ndim() != 3 {
        anyhow::bail!("Expected 3D NIfTI volume, found shape {:?}", volume.shape());
    }
    let volume = volume.into_dimensionality::<Ix3>()?;
    tracing::debug!(path = %path.display(), shape = ?volume.shape(), "read NIfTI volume");
    Ok((volume.as_standard_layout().into_owned(), affine))
}

/// Read a NIfTI-1 file as an image.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let (array, affine) = read_nifti_volume(path)?;
    Image::from_affine(array_to_tensor::<B>(&array, device), &affine)
        .with_context(|| format!("Degenerate affine in {}", path.display()))
}

/// Write an `[i, j, k]` array with the given affine stored as the sform.
pub fn write_nifti_volume<P: AsRef<Path>>(path: P, array: &Array3<f32>, affine: &Matrix4<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut header = NiftiHeader::default();
    let row = |r: usize| -> [f32; 4] {
        [
            affine[(r, 0)] as f32,
            affine[(r, 1)] as f32,
            affine[(r, 2)] as f32,
            affine[(r, 3)] as f32,
        ]
    };
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.sform_code = 1;
    header.qform_code = 0;
    for c in 0..3 {
        let norm = (0..3).map(|r| affine[(r, c)].powi(2)).sum::<f64>().sqrt();
        header.pixdim[c + 1] = norm as f32;
    }

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote NIfTI volume");
    Ok(())
}

/// Write an image, keeping its affine.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let array = tensor_to_array(image.data())?;
    write_nifti_volume(path, &array, &image.affine())
}

fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    if header.sform_code > 0 {
        for (r, row) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
            for c in 0..4 {
                affine[(r, c)] = row[c] as f64;
            }
        }
    } else if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let rotation = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let scale = [
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64 * qfac,
        ];
        let offset = [header.quatern_x, header.quatern_y, header.quatern_z];
        for r in 0..3 {
            for col in 0..3 {
                affine[(r, col)] = rotation[r][col] * scale[col];
            }
            affine[(r, 3)] = offset[r] as f64;
        }
    } else {
        for d in 0..3 {
            let size = header.pixdim[d + 1] as f64;
            affine[(d, d)] = if size > 0.0 { size } else { 1.0 };
        }
    }
    affine
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_volume_roundtrip_keeps_affine() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vol.nii");
        let array = Array3::from_shape_fn((3, 4, 5), |(i, j, k)| (i + 3 * j + 12 * k) as f32);
        #[rustfmt::skip]
        let affine = Matrix4::new(
            2.0, 0.0, 0.0, -10.0,
            0.0, 2.0, 0.0, -12.0,
            0.0, 0.0, 3.0,   4.0,
            0.0, 0.0, 0.0,   1.0,
        );
        write_nifti_volume(&path, &array, &affine)?;
        let (read, read_affine) = read_nifti_volume(&path)?;
        assert_eq!(read, array);
        assert_eq!(read_affine, affine);
        Ok(())
    }

    #[test]
    fn test_image_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("image.nii");
        let device = Default::default();
        let array = Array3::from_shape_fn((5, 4, 3), |(i, j, k)| (i * j + k) as f32);
        let mut affine = Matrix4::identity();
        affine[(0, 3)] = 7.0;
        let image = Image::from_affine(array_to_tensor::<TestBackend>(&array, &device), &affine).unwrap();
        write_nifti(&path, &image)?;

        let read = read_nifti::<TestBackend, _>(&path, &device)?;
        assert_eq!(read.shape(), [3, 4, 5]);
        assert_eq!(read.affine(), affine);
        assert_eq!(tensor_to_array(read.data())?, array);
        Ok(())
    }

    #[test]
    fn test_header_without_sform_uses_pixdim() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 0;
        header.pixdim = [1.0, 0.5, 0.75, 2.0, 1.0, 1.0, 1.0, 1.0];
        let affine = header_affine(&header);
        assert_eq!(affine[(0, 0)], 0.5);
        assert_eq!(affine[(1, 1)], 0.75);
        assert_eq!(affine[(2, 2)], 2.0);
        assert_eq!(affine[(0, 3)], 0.0);
    }

    #[test]
    fn test_qform_identity_quaternion() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 1;
        header.quatern_b = 0.0;
        header.quatern_c = 0.0;
        header.quatern_d = 0.0;
        header.quatern_x = 1.0;
        header.quatern_y = 2.0;
        header.quatern_z = 3.0;
        header.pixdim = [-1.0, 1.0, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0];
        let affine = header_affine(&header);
        assert_eq!(affine[(0, 0)], 1.0);
        assert_eq!(affine[(1, 1)], 2.0);
        assert_eq!(affine[(2, 2)], -3.0);
        assert_eq!(affine[(2, 3)], 3.0);
    }
}
