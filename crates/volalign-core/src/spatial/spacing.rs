//! Physical distance between adjacent voxels along each axis.

use super::Vector;

/// Voxel spacing. A type alias of [`Vector`] kept separate for readability.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing along every axis.
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    /// Arithmetic mean of the per-axis spacing.
    pub fn mean_spacing(&self) -> f64 {
        if D == 0 {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / D as f64
    }

    /// Spacing multiplied per axis by integer shrink factors.
    pub fn scaled(&self, factors: [usize; D]) -> Self {
        let mut out = *self;
        for (d, &f) in factors.iter().enumerate() {
            out[d] *= f as f64;
        }
        out
    }
}
