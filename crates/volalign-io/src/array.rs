//! Conversions between `[i, j, k]` ndarray volumes and `[Z, Y, X]` tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use ndarray::Array3;

/// `array[[i, j, k]]` becomes `tensor[[k, j, i]]`.
pub fn array_to_tensor<B: Backend>(array: &Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (nx, ny, nz) = array.dim();
    let values: Vec<f32> = array.view().permuted_axes([2, 1, 0]).iter().copied().collect();
    Tensor::from_data(TensorData::new(values, Shape::new([nz, ny, nx])), device)
}

/// Inverse of [`array_to_tensor`].
pub fn tensor_to_array<B: Backend>(tensor: &Tensor<B, 3>) -> anyhow::Result<Array3<f32>> {
    let [nz, ny, nx] = tensor.dims();
    let values = tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {:?}", e))?;
    let zyx = Array3::from_shape_vec((nz, ny, nx), values)?;
    Ok(zyx.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
}
