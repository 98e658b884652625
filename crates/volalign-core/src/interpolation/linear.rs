//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use super::trait_::Interpolator;

/// Trilinear interpolator.
///
/// Weights are `index - floor(index)`, so the derivative with respect to the
/// sampling position is the finite difference of the neighbouring voxels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }

    fn gather<B: Backend>(
        flat: &Tensor<B, 1>,
        xi: &Tensor<B, 1, Int>,
        yi: &Tensor<B, 1, Int>,
        zi: &Tensor<B, 1, Int>,
        stride_y: i64,
        stride_z: i64,
    ) -> Tensor<B, 1> {
        let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
        flat.clone().gather(0, idx)
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [nz, ny, nx] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let clamp = |t: Tensor<B, 1>, n: usize| t.clamp(0.0, (n - 1) as f64).int();
        let x1_i = clamp(x0.clone() + 1.0, nx);
        let y1_i = clamp(y0.clone() + 1.0, ny);
        let z1_i = clamp(z0.clone() + 1.0, nz);
        let x0_i = clamp(x0, nx);
        let y0_i = clamp(y0, ny);
        let z0_i = clamp(z0, nz);

        let stride_z = (ny * nx) as i64;
        let stride_y = nx as i64;
        let flat = data.clone().reshape([nz * ny * nx]);

        let v000 = Self::gather(&flat, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
        let v100 = Self::gather(&flat, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
        let v010 = Self::gather(&flat, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
        let v110 = Self::gather(&flat, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
        let v001 = Self::gather(&flat, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
        let v101 = Self::gather(&flat, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
        let v011 = Self::gather(&flat, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
        let v111 = Self::gather(&flat, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

        // along x, then y, then z
        let lerp = |a: Tensor<B, 1>, b: Tensor<B, 1>, w: &Tensor<B, 1>| a.clone() + (b - a) * w.clone();
        let c00 = lerp(v000, v100, &wx);
        let c10 = lerp(v010, v110, &wx);
        let c01 = lerp(v001, v101, &wx);
        let c11 = lerp(v011, v111, &wx);
        let c0 = lerp(c00, c10, &wy);
        let c1 = lerp(c01, c11, &wy);
        lerp(c0, c1, &wz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn ramp(device: &<B as Backend>::Device) -> Tensor<B, 3> {
        // value = x + 10 y + 100 z on a [Z=2, Y=2, X=3] grid
        let mut values = Vec::new();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..3 {
                    values.push((x + 10 * y + 100 * z) as f32);
                }
            }
        }
        Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([2, 2, 3])
    }

    #[test]
    fn test_trilinear_reproduces_linear_field() {
        let device = Default::default();
        let data = ramp(&device);
        let indices = Tensor::<B, 2>::from_floats(
            [[0.0, 0.0, 0.0], [2.0, 1.0, 1.0], [0.5, 0.5, 0.5], [1.25, 0.0, 0.75]],
            &device,
        );
        let values = LinearInterpolator::new()
            .interpolate(&data, indices)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let expected = [0.0, 112.0, 55.5, 76.25];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-4, "{v} vs {e}");
        }
    }

    #[test]
    fn test_out_of_bounds_clamps_to_border() {
        let device = Default::default();
        let data = ramp(&device);
        let indices = Tensor::<B, 2>::from_floats([[-3.0, 0.0, 0.0], [7.0, 1.0, 1.0]], &device);
        let values = LinearInterpolator::new()
            .interpolate(&data, indices)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(values, vec![0.0, 112.0]);
    }

    #[test]
    fn test_gradient_wrt_position() {
        type AB = Autodiff<B>;
        let device = Default::default();
        let data: Tensor<AB, 3> = Tensor::from_inner(ramp(&device));
        let indices = Tensor::<AB, 2>::from_floats([[0.5, 0.5, 0.5]], &device).require_grad();
        let value = LinearInterpolator::new().interpolate(&data, indices.clone()).sum();
        let grads = value.backward();
        let grad = indices.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        assert!((grad[0] - 1.0).abs() < 1e-4);
        assert!((grad[1] - 10.0).abs() < 1e-4);
        assert!((grad[2] - 100.0).abs() < 1e-4);
    }
}
