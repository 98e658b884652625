//! Affine transform (linear map + translation about a fixed center).

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::Matrix4;
use super::trait_::Transform;

/// `T(x) = A(x - c) + c + t`
///
/// * `A` - `[D, D]` linear part (rotation, scale, shear)
/// * `t` - `[D]` translation
/// * `c` - `[D]` fixed center
///
/// The tensors may carry autodiff history; the registration objective builds
/// them from a parameter tensor that requires gradients.
#[derive(Debug, Clone)]
pub struct AffineTransform<B: Backend, const D: usize> {
    matrix: Tensor<B, 2>,
    translation: Tensor<B, 1>,
    center: Tensor<B, 1>,
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>, center: Tensor<B, 1>) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    /// Identity transform about the world origin.
    pub fn identity(device: &B::Device) -> Self {
        Self::new(
            Tensor::eye(D, device),
            Tensor::zeros([D], device),
            Tensor::zeros([D], device),
        )
    }

    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.clone()
    }

    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.clone()
    }

    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }
}

impl<B: Backend> AffineTransform<B, 3> {
    /// Build from a homogeneous 4×4 matrix acting on world points.
    pub fn from_homogeneous(matrix: &Matrix4<f64>, device: &B::Device) -> Self {
        let mut linear = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                linear.push(matrix[(r, c)] as f32);
            }
        }
        let offset: Vec<f32> = (0..3).map(|r| matrix[(r, 3)] as f32).collect();
        Self::new(
            Tensor::from_data(TensorData::new(linear, Shape::new([3, 3])), device),
            Tensor::from_data(TensorData::new(offset, Shape::new([3])), device),
            Tensor::zeros([3], device),
        )
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row-vector form: y = (x - c) @ A^T + c + t
        let c = self.center.clone().reshape([1, D]);
        let t = self.translation.clone().reshape([1, D]);
        (points - c.clone()).matmul(self.matrix.clone().transpose()) + c + t
    }
}
