//! Parameterized transform families used by the registration stages.
//!
//! Parameter layout (a family's vector is a prefix of the next one):
//!
//! | index  | meaning                          | identity |
//! |--------|----------------------------------|----------|
//! | 0..3   | translation `tx, ty, tz`         | 0        |
//! | 3..6   | Euler angles `rx, ry, rz` (rad)  | 0        |
//! | 6..9   | scales `sx, sy, sz`              | 1        |
//! | 9..12  | shears `kxy, kxz, kyz`           | 0        |
//!
//! The linear part is `L = R · K · S` with `S = diag(sx, sy, sz)` and `K` the
//! unit upper-triangular shear matrix, and the map is `T(x) = L(x - c) + c + t`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3};
use crate::spatial::Point;
use super::affine::AffineTransform;
use super::rotation::{euler_rotation_matrix, euler_rotation_tensor};

/// Transform family, ordered by number of degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformKind {
    Translation,
    Rigid,
    Affine,
}

impl TransformKind {
    pub fn num_parameters(&self) -> usize {
        match self {
            TransformKind::Translation => 3,
            TransformKind::Rigid => 6,
            TransformKind::Affine => 12,
        }
    }

    /// Parameter vector of the identity transform.
    pub fn identity_values(&self) -> Vec<f64> {
        const IDENTITY: [f64; 12] = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        IDENTITY[..self.num_parameters()].to_vec()
    }

    /// Build the tensor transform for a `[num_parameters]` parameter tensor.
    ///
    /// Every entry of the resulting transform is a differentiable function of
    /// `params`.
    pub fn compose<B: Backend>(
        &self,
        params: Tensor<B, 1>,
        center: Tensor<B, 1>,
    ) -> AffineTransform<B, 3> {
        let device = params.device();
        let translation = params.clone().slice([0..3]);
        let linear = match self {
            TransformKind::Translation => Tensor::eye(3, &device),
            TransformKind::Rigid => euler_rotation_tensor(params.slice([3..6])),
            TransformKind::Affine => {
                let rotation = euler_rotation_tensor(params.clone().slice([3..6]));
                let sx = params.clone().slice([6..7]);
                let sy = params.clone().slice([7..8]);
                let sz = params.clone().slice([8..9]);
                let kxy = params.clone().slice([9..10]);
                let kxz = params.clone().slice([10..11]);
                let kyz = params.slice([11..12]);
                let zero = Tensor::<B, 1>::zeros([1], &device);

                // K · S
                let row1 = Tensor::cat(vec![sx, kxy * sy.clone(), kxz * sz.clone()], 0).reshape([1, 3]);
                let row2 = Tensor::cat(vec![zero.clone(), sy, kyz * sz.clone()], 0).reshape([1, 3]);
                let row3 = Tensor::cat(vec![zero.clone(), zero, sz], 0).reshape([1, 3]);
                rotation.matmul(Tensor::cat(vec![row1, row2, row3], 0))
            }
        };
        AffineTransform::new(linear, translation, center)
    }
}

/// A concrete transform of one family: parameter values plus a fixed center.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParameters {
    kind: TransformKind,
    values: Vec<f64>,
    center: Point<3>,
}

impl TransformParameters {
    /// `None` if `values` does not have the family's length.
    pub fn new(kind: TransformKind, values: Vec<f64>, center: Point<3>) -> Option<Self> {
        (values.len() == kind.num_parameters()).then_some(Self { kind, values, center })
    }

    pub fn identity(kind: TransformKind, center: Point<3>) -> Self {
        Self {
            kind,
            values: kind.identity_values(),
            center,
        }
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn center(&self) -> &Point<3> {
        &self.center
    }

    /// Translation `t` (not the homogeneous offset).
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.values[0], self.values[1], self.values[2])
    }

    /// Linear part `L`.
    pub fn linear_matrix(&self) -> Matrix3<f64> {
        match self.kind {
            TransformKind::Translation => Matrix3::identity(),
            TransformKind::Rigid => self.rotation(),
            TransformKind::Affine => {
                let v = &self.values;
                #[rustfmt::skip]
                let ks = Matrix3::new(
                    v[6], v[9] * v[7], v[10] * v[8],
                    0.0,  v[7],        v[11] * v[8],
                    0.0,  0.0,         v[8],
                );
                self.rotation() * ks
            }
        }
    }

    /// Homogeneous matrix `[L | c + t - L c]` acting on world points.
    pub fn matrix(&self) -> Matrix4<f64> {
        let linear = self.linear_matrix();
        let c = self.center.0.coords;
        let offset = c + self.translation() - linear * c;
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        m
    }

    /// Re-express in a family with at least as many degrees of freedom,
    /// padding the new entries with identity values. `None` when narrowing.
    pub fn widen(&self, kind: TransformKind) -> Option<Self> {
        if kind < self.kind {
            return None;
        }
        let mut values = kind.identity_values();
        values[..self.values.len()].copy_from_slice(&self.values);
        Some(Self {
            kind,
            values,
            center: self.center,
        })
    }

    /// Copy with different values of the same family.
    pub fn with_values(&self, values: Vec<f64>) -> Option<Self> {
        Self::new(self.kind, values, self.center)
    }

    /// `det(L)` is positive and bounded away from zero.
    pub fn is_nonsingular(&self) -> bool {
        let det = self.linear_matrix().determinant();
        det.is_finite() && det > 1e-3
    }

    /// Parameter values as a `[num_parameters]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        let values: Vec<f32> = self.values.iter().map(|&v| v as f32).collect();
        Tensor::from_data(TensorData::new(values, Shape::new([self.values.len()])), device)
    }

    /// Center as a `[3]` tensor.
    pub fn center_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(self.center.to_f32_vec(), Shape::new([3])), device)
    }

    /// Tensor transform equivalent to [`TransformParameters::matrix`].
    pub fn to_affine_transform<B: Backend>(&self, device: &B::Device) -> AffineTransform<B, 3> {
        self.kind
            .compose(self.to_tensor(device), self.center_tensor(device))
    }

    fn rotation(&self) -> Matrix3<f64> {
        euler_rotation_matrix(self.values[3], self.values[4], self.values[5])
    }
}
