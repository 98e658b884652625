//! Image type with physical metadata and coordinate transformations.
//!
//! The tensor is stored `[Z, Y, X]`; index tuples are `(x, y, z)`, so tensor
//! dimension `d` corresponds to index axis `D - 1 - d`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, SMatrix, Vector3};
use crate::spatial::{Direction, Point, Spacing, Vector};
use super::grid;

/// Scalar volume with physical metadata.
///
/// The voxel-to-world map is `point = origin + direction * (index * spacing)`.
///
/// # Examples
/// ```rust
/// use volalign_core::Image;
/// use volalign_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(
///     data,
///     Point3::new([0.0, 0.0, 0.0]),
///     Spacing3::new([1.0, 1.0, 1.0]),
///     Direction3::identity(),
/// );
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    /// `direction * diag(spacing)`
    index_to_world: SMatrix<f64, D, D>,
    world_to_index: SMatrix<f64, D, D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image.
    ///
    /// # Panics
    /// Panics if `direction * diag(spacing)` is singular. Use [`Image::try_new`]
    /// for metadata that has not been validated.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        match Self::try_new(data, origin, spacing, direction) {
            Some(image) => image,
            None => panic!("image direction and spacing must form an invertible matrix"),
        }
    }

    /// Create a new image, returning `None` if the voxel-to-world matrix is singular.
    pub fn try_new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Option<Self> {
        let index_to_world = direction.0 * SMatrix::<f64, D, D>::from_diagonal(&spacing.0);
        let world_to_index = index_to_world.try_inverse()?;
        if world_to_index.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self {
            data,
            origin,
            spacing,
            direction,
            index_to_world,
            world_to_index,
        })
    }

    /// Same metadata, different voxel data.
    ///
    /// Used by filters that change intensities but not geometry.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self {
            data,
            origin: self.origin,
            spacing: self.spacing,
            direction: self.direction,
            index_to_world: self.index_to_world,
            world_to_index: self.world_to_index,
        }
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Tensor shape, `[Z, Y, X]` for volumes.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Number of voxels along each index axis, `(nx, ny, nz)` for volumes.
    pub fn size(&self) -> [usize; D] {
        let mut size = self.shape();
        size.reverse();
        size
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Map a continuous index to a world point.
    pub fn index_to_world(&self, index: &Point<D>) -> Point<D> {
        self.origin + Vector(self.index_to_world * index.0.coords)
    }

    /// Map a world point to a continuous index.
    pub fn world_to_index(&self, point: &Point<D>) -> Point<D> {
        let diff = *point - self.origin;
        Point(nalgebra::Point::from(self.world_to_index * diff.0))
    }

    /// World position of the geometric center of the voxel grid.
    pub fn world_center(&self) -> Point<D> {
        let mut index = Point::<D>::origin();
        for (axis, &n) in self.size().iter().enumerate() {
            index[axis] = (n as f64 - 1.0) / 2.0;
        }
        self.index_to_world(&index)
    }

    /// Half the world-space length of the grid diagonal.
    pub fn half_diagonal(&self) -> f64 {
        let mut extent = Vector::<D>::zeros();
        for (axis, &n) in self.size().iter().enumerate() {
            extent[axis] = (n as f64 - 1.0).max(0.0);
        }
        (self.index_to_world * extent.0).norm() / 2.0
    }

    /// Batch map of continuous indices `[N, D]` to world points `[N, D]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        // Row-vector form: P = I @ M^T + O
        let m_t = self.matrix_tensor(&self.index_to_world.transpose(), &device);
        indices.matmul(m_t) + self.origin_tensor(&device)
    }

    /// Batch map of world points `[N, D]` to continuous indices `[N, D]`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let m_t = self.matrix_tensor(&self.world_to_index.transpose(), &device);
        (points - self.origin_tensor(&device)).matmul(m_t)
    }

    /// World coordinates of every voxel center, in tensor memory order.
    pub fn world_grid(&self) -> Tensor<B, 2> {
        let indices = grid::voxel_grid::<B, D>(self.shape(), &self.data.device());
        self.index_to_world_tensor(indices)
    }

    /// `1.0` where a continuous index lies inside the voxel grid, else `0.0`.
    ///
    /// An index is inside when `0 <= i <= n - 1` on every axis (with a small
    /// tolerance for rounding of world/index round trips).
    pub fn inside_mask(&self, indices: &Tensor<B, 2>) -> Tensor<B, 1> {
        const EPS: f64 = 1e-3;
        let [n, _] = indices.dims();
        let device = indices.device();
        let mut mask = Tensor::<B, 1>::ones([n], &device);
        for (axis, &len) in self.size().iter().enumerate() {
            let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
            let lower = coord.clone().greater_equal_elem(-EPS).float();
            let upper = coord.lower_equal_elem(len as f64 - 1.0 + EPS).float();
            mask = mask * lower * upper;
        }
        mask
    }

    fn origin_tensor(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_data(
            TensorData::new(self.origin.to_f32_vec(), Shape::new([D])),
            device,
        )
        .reshape([1, D])
    }

    fn matrix_tensor(&self, m: &SMatrix<f64, D, D>, device: &B::Device) -> Tensor<B, 2> {
        // nalgebra is column-major; tensors want row-major
        let mut values = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                values.push(m[(r, c)] as f32);
            }
        }
        Tensor::<B, 2>::from_data(TensorData::new(values, Shape::new([D, D])), device)
    }
}

impl<B: Backend> Image<B, 3> {
    /// Build a volume from `[Z, Y, X]` data and a 4×4 voxel-to-world affine.
    ///
    /// Spacing is taken from the column norms of the linear block, direction
    /// from the normalized columns and origin from the last column. Returns
    /// `None` for degenerate or non-finite affines.
    pub fn from_affine(data: Tensor<B, 3>, affine: &Matrix4<f64>) -> Option<Self> {
        if affine.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let linear: Matrix3<f64> = affine.fixed_view::<3, 3>(0, 0).into_owned();
        let mut spacing = Spacing::<3>::zeros();
        let mut columns = [Vector3::zeros(); 3];
        for (c, column) in columns.iter_mut().enumerate() {
            let col = linear.column(c).into_owned();
            let norm = col.norm();
            if norm < 1e-12 {
                return None;
            }
            spacing[c] = norm;
            *column = col / norm;
        }
        let direction = Direction(Matrix3::from_columns(&columns));
        if direction.determinant().abs() < 1e-9 {
            return None;
        }
        let origin = Point::new([affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]]);
        Self::try_new(data, origin, spacing, direction)
    }

    /// The 4×4 voxel-to-world affine of this volume.
    pub fn affine(&self) -> Matrix4<f64> {
        let mut affine = Matrix4::identity();
        affine
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.index_to_world);
        for r in 0..3 {
            affine[(r, 3)] = self.origin[r];
        }
        affine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn volume(shape: [usize; 3]) -> Tensor<Backend, 3> {
        Tensor::<Backend, 3>::zeros(shape, &Default::default())
    }

    #[test]
    fn test_image_metadata() {
        let image = Image::new(
            volume([4, 5, 6]),
            Point::new([1.0, 2.0, 3.0]),
            Spacing::new([1.0, 2.0, 3.0]),
            Direction::identity(),
        );
        assert_eq!(image.shape(), [4, 5, 6]);
        assert_eq!(image.size(), [6, 5, 4]);
        assert_eq!(image.num_voxels(), 120);
    }

    #[test]
    fn test_index_world_roundtrip() {
        let image = Image::new(
            volume([10, 10, 10]),
            Point::new([10.0, 20.0, 30.0]),
            Spacing::new([2.0, 2.0, 2.0]),
            Direction::identity(),
        );
        let index = Point::new([5.0, 2.5, 1.0]);
        let world = image.index_to_world(&index);
        assert_eq!(world, Point::new([20.0, 25.0, 32.0]));
        let back = image.world_to_index(&world);
        for i in 0..3 {
            assert!((back[i] - index[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_affine_roundtrip() {
        #[rustfmt::skip]
        let affine = Matrix4::new(
            0.0, -2.0, 0.0, 12.0,
            1.5,  0.0, 0.0, -4.0,
            0.0,  0.0, 3.0,  7.0,
            0.0,  0.0, 0.0,  1.0,
        );
        let image = Image::from_affine(volume([3, 4, 5]), &affine).expect("valid affine");
        assert_eq!(image.spacing(), &Spacing::new([1.5, 2.0, 3.0]));
        assert!(image.direction().is_orthogonal());
        assert!((image.affine() - affine).amax() < 1e-12);
    }

    #[test]
    fn test_from_affine_rejects_degenerate() {
        let mut affine = Matrix4::identity();
        affine[(1, 1)] = 0.0;
        assert!(Image::from_affine(volume([2, 2, 2]), &affine).is_none());

        let mut collinear = Matrix4::identity();
        collinear[(0, 1)] = 1.0;
        collinear[(1, 1)] = 0.0;
        assert!(Image::from_affine(volume([2, 2, 2]), &collinear).is_none());
    }

    #[test]
    fn test_world_center_and_half_diagonal() {
        let image = Image::new(
            volume([5, 5, 5]),
            Point::new([0.0, 0.0, 0.0]),
            Spacing::new([1.0, 1.0, 1.0]),
            Direction::identity(),
        );
        assert_eq!(image.world_center(), Point::new([2.0, 2.0, 2.0]));
        assert!((image.half_diagonal() - 48f64.sqrt() / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tensor_mapping_matches_host() {
        let image = Image::new(
            volume([4, 4, 4]),
            Point::new([-3.0, 1.0, 2.0]),
            Spacing::new([0.5, 1.0, 2.0]),
            Direction::identity(),
        );
        let device = Default::default();
        let indices = Tensor::<Backend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let world = image.index_to_world_tensor(indices.clone());
        let values = world.clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![-2.5, 3.0, 8.0]);

        let back = image.world_to_index_tensor(world).into_data().to_vec::<f32>().unwrap();
        assert_eq!(back, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_inside_mask() {
        let image = Image::new(
            volume([3, 4, 5]),
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        );
        let device = Default::default();
        // size is (x=5, y=4, z=3)
        let indices = Tensor::<Backend, 2>::from_floats(
            [[0.0, 0.0, 0.0], [4.0, 3.0, 2.0], [4.5, 0.0, 0.0], [0.0, -0.5, 0.0], [2.0, 1.0, 2.5]],
            &device,
        );
        let mask = image.inside_mask(&indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
