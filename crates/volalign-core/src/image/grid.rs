//! Voxel index grids.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};

/// Continuous indices `(x, y, z, ...)` of every voxel of a tensor shape.
///
/// Rows follow the tensor's row-major memory order, so the result can be
/// reshaped back to `shape` after sampling. Returns `[N, D]`.
pub fn voxel_grid<B: Backend, const D: usize>(shape: [usize; D], device: &B::Device) -> Tensor<B, 2> {
    let total: usize = shape.iter().product();
    let mut columns = Vec::with_capacity(D);
    // Index axis `a` is tensor dimension `D - 1 - a`.
    for axis in 0..D {
        let dim = D - 1 - axis;
        let n = shape[dim];
        let mut view = [1usize; D];
        view[dim] = n;
        let mut reps = shape;
        reps[dim] = 1;
        let coord: Tensor<B, D, Int> = Tensor::<B, 1, Int>::arange(0..n as i64, device).reshape(view);
        let coord = coord.repeat(&reps).reshape([total]).float();
        columns.push(coord.unsqueeze_dim::<2>(1));
    }
    Tensor::cat(columns, 1)
}

/// A deterministic subset of voxel indices: every `stride`-th voxel in memory
/// order, where `stride = round(1 / proportion)`.
///
/// `proportion >= 1` yields the full grid.
pub fn strided_voxel_grid<B: Backend, const D: usize>(
    shape: [usize; D],
    proportion: f64,
    device: &B::Device,
) -> Tensor<B, 2> {
    let stride = if proportion >= 1.0 || proportion <= 0.0 {
        1
    } else {
        (1.0 / proportion).round().max(1.0) as usize
    };
    if stride == 1 {
        return voxel_grid::<B, D>(shape, device);
    }

    let total: usize = shape.iter().product();
    let mut values = Vec::with_capacity((total / stride + 1) * D);
    let mut count = 0;
    for flat in (0..total).step_by(stride) {
        let mut rem = flat;
        let mut index = [0usize; D];
        for dim in (0..D).rev() {
            index[dim] = rem % shape[dim];
            rem /= shape[dim];
        }
        for axis in 0..D {
            values.push(index[D - 1 - axis] as f32);
        }
        count += 1;
    }
    Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([count * D])), device)
        .reshape([count, D])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_voxel_grid_order() {
        let device = Default::default();
        // shape [Z=2, Y=1, X=3]
        let grid = voxel_grid::<B, 3>([2, 1, 3], &device);
        assert_eq!(grid.dims(), [6, 3]);
        let values = grid.into_data().to_vec::<f32>().unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            2.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
            1.0, 0.0, 1.0,
            2.0, 0.0, 1.0,
        ];
        assert_eq!(values, expected);
    }

    #[test]
    fn test_strided_grid() {
        let device = Default::default();
        let full = voxel_grid::<B, 3>([4, 4, 4], &device);
        let all = strided_voxel_grid::<B, 3>([4, 4, 4], 1.0, &device);
        assert_eq!(
            full.into_data().to_vec::<f32>().unwrap(),
            all.into_data().to_vec::<f32>().unwrap()
        );

        let quarter = strided_voxel_grid::<B, 3>([4, 4, 4], 0.25, &device);
        assert_eq!(quarter.dims(), [16, 3]);
        let values = quarter.into_data().to_vec::<f32>().unwrap();
        // flat index 4 -> (x=0, y=1, z=0)
        assert_eq!(&values[3..6], &[0.0, 1.0, 0.0]);
    }
}
