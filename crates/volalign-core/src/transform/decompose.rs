//! Decomposition of a homogeneous affine into rotation, scale, shear and translation.

use nalgebra::{Matrix3, Matrix4};
use serde::{Deserialize, Serialize};
use super::rotation::euler_angles;

/// Components of `x -> R · K · S · x + offset`.
///
/// Angles follow the `Rz · Ry · Rx` convention of the rigid and affine
/// transform families. A matrix with negative determinant is reported with a
/// negative `z` scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineDecomposition {
    /// Euler angles `(rx, ry, rz)` in radians.
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
    /// `(kxy, kxz, kyz)`
    pub shear: [f64; 3],
    /// Homogeneous offset (last column).
    pub translation: [f64; 3],
}

impl AffineDecomposition {
    pub fn rotation_degrees(&self) -> [f64; 3] {
        self.rotation.map(f64::to_degrees)
    }
}

/// Split a 4×4 affine into its components. `None` for singular matrices.
pub fn decompose_affine(matrix: &Matrix4<f64>) -> Option<AffineDecomposition> {
    let mut linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let det = linear.determinant();
    if !det.is_finite() || det.abs() < 1e-12 {
        return None;
    }
    let mirrored = det < 0.0;
    if mirrored {
        linear.column_mut(2).neg_mut();
    }
    let (rotation, upper) = rotation_and_upper(&linear);
    let scale = [upper[(0, 0)], upper[(1, 1)], upper[(2, 2)]];
    let shear = [
        upper[(0, 1)] / scale[1],
        upper[(0, 2)] / scale[2],
        upper[(1, 2)] / scale[2],
    ];
    let mut scale = scale;
    if mirrored {
        scale[2] = -scale[2];
    }
    Some(AffineDecomposition {
        rotation: euler_angles(&rotation),
        scale,
        shear,
        translation: [matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]],
    })
}

/// `linear = rotation · upper` with `upper` upper-triangular, positive diagonal.
fn rotation_and_upper(linear: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let qr = linear.qr();
    let mut q = qr.q();
    let mut r = qr.r();
    for i in 0..3 {
        if r[(i, i)] < 0.0 {
            q.column_mut(i).neg_mut();
            r.row_mut(i).neg_mut();
        }
    }
    (q, r)
}
