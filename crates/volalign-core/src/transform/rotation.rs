//! Euler-angle rotations, `R = Rz(gamma) · Ry(beta) · Rx(alpha)`, angles in radians.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::Matrix3;

/// Rotation matrix `[3, 3]` from a `[3]` tensor of angles `(alpha, beta, gamma)`.
///
/// Built from elementwise tensor ops so gradients reach the angles.
pub fn euler_rotation_tensor<B: Backend>(angles: Tensor<B, 1>) -> Tensor<B, 2> {
    let alpha = angles.clone().slice([0..1]);
    let beta = angles.clone().slice([1..2]);
    let gamma = angles.slice([2..3]);

    let cx = alpha.clone().cos();
    let sx = alpha.sin();
    let cy = beta.clone().cos();
    let sy = beta.sin();
    let cz = gamma.clone().cos();
    let sz = gamma.sin();

    let r11 = cz.clone() * cy.clone();
    let r12 = cz.clone() * sy.clone() * sx.clone() - sz.clone() * cx.clone();
    let r13 = cz.clone() * sy.clone() * cx.clone() + sz.clone() * sx.clone();

    let r21 = sz.clone() * cy.clone();
    let r22 = sz.clone() * sy.clone() * sx.clone() + cz.clone() * cx.clone();
    let r23 = sz * sy.clone() * cx.clone() - cz * sx.clone();

    let r31 = sy.neg();
    let r32 = cy.clone() * sx;
    let r33 = cy * cx;

    let row1 = Tensor::cat(vec![r11, r12, r13], 0).reshape([1, 3]);
    let row2 = Tensor::cat(vec![r21, r22, r23], 0).reshape([1, 3]);
    let row3 = Tensor::cat(vec![r31, r32, r33], 0).reshape([1, 3]);
    Tensor::cat(vec![row1, row2, row3], 0)
}

/// Host-side counterpart of [`euler_rotation_tensor`].
pub fn euler_rotation_matrix(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let (sx, cx) = alpha.sin_cos();
    let (sy, cy) = beta.sin_cos();
    let (sz, cz) = gamma.sin_cos();
    Matrix3::new(
        cz * cy, cz * sy * sx - sz * cx, cz * sy * cx + sz * sx,
        sz * cy, sz * sy * sx + cz * cx, sz * sy * cx - cz * sx,
        -sy, cy * sx, cy * cx,
    )
}

/// Recover `(alpha, beta, gamma)` from a rotation matrix.
///
/// `beta` is taken in `[-pi/2, pi/2]`. At gimbal lock (`|beta| = pi/2`)
/// `alpha` is fixed to zero and the remaining angle goes to `gamma`.
pub fn euler_angles(rotation: &Matrix3<f64>) -> [f64; 3] {
    let beta = (-rotation[(2, 0)]).clamp(-1.0, 1.0).asin();
    if beta.cos().abs() > 1e-6 {
        let alpha = rotation[(2, 1)].atan2(rotation[(2, 2)]);
        let gamma = rotation[(1, 0)].atan2(rotation[(0, 0)]);
        [alpha, beta, gamma]
    } else {
        let gamma = (-rotation[(0, 1)]).atan2(rotation[(1, 1)]);
        [0.0, beta, gamma]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use std::f64::consts::FRAC_PI_2;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_tensor_matches_host() {
        let device = Default::default();
        let angles = [0.3, -0.2, 0.7];
        let tensor = euler_rotation_tensor(Tensor::<TestBackend, 1>::from_floats(angles, &device));
        let values = tensor.into_data().to_vec::<f32>().unwrap();
        let host = euler_rotation_matrix(0.3, -0.2, 0.7);
        for r in 0..3 {
            for c in 0..3 {
                assert!((values[r * 3 + c] as f64 - host[(r, c)]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let r = euler_rotation_matrix(0.0, 0.0, FRAC_PI_2);
        let v = r * nalgebra::Vector3::new(1.0, 0.0, 0.0);
        assert!((v - nalgebra::Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_angles_roundtrip() {
        for &(a, b, g) in &[(0.1, 0.2, 0.3), (-1.0, 0.5, 2.5), (0.0, 0.0, 0.0), (3.0, -1.2, -3.0)] {
            let r = euler_rotation_matrix(a, b, g);
            let [a2, b2, g2] = euler_angles(&r);
            let r2 = euler_rotation_matrix(a2, b2, g2);
            assert!((r - r2).amax() < 1e-9);
            assert!((a - a2).abs() < 1e-9 && (b - b2).abs() < 1e-9 && (g - g2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gimbal_lock() {
        let r = euler_rotation_matrix(0.4, FRAC_PI_2, 0.1);
        let angles = euler_angles(&r);
        assert_eq!(angles[0], 0.0);
        assert!((angles[1] - FRAC_PI_2).abs() < 1e-6);
        assert!((euler_rotation_matrix(angles[0], angles[1], angles[2]) - r).amax() < 1e-6);
    }
}
