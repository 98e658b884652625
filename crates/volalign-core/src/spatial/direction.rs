//! Orientation of the voxel axes in physical space.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Direction cosine matrix. Column `i` is the world direction of index axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// No rotation.
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Inverse matrix, if any.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Columns are unit length and mutually orthogonal.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0.transpose() * self.0;
        (product - SMatrix::<f64, D, D>::identity()).amax() < 1e-6
    }
}

impl Direction<3> {
    /// Determinant of the matrix; negative for left-handed orientations.
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
