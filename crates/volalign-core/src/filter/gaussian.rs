use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;
use crate::image::Image;
use crate::spatial::Spacing;

/// Cap on `2 * radius + 1`.
const MAX_KERNEL_WIDTH: usize = 65;

/// Gaussian smoothing filter.
///
/// Separable 1-D convolutions, one per axis, with the border value replicated
/// outwards so that small volumes are not darkened at their edges. Sigmas are
/// in physical units and converted to voxels with the image spacing.
pub struct GaussianFilter<B: Backend> {
    /// Per index axis `(x, y, z)`; a single value applies to every axis.
    sigmas: Vec<f64>,
    _b: PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            _b: PhantomData,
        }
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        image.with_data(self.apply_tensor(image.data().clone(), image.spacing()))
    }

    pub fn apply_tensor<const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        let device = data.device();

        for dim in 0..D {
            let axis = D - 1 - dim;
            let sigma = self.sigmas.get(axis).or(self.sigmas.first()).copied().unwrap_or(0.0);
            if sigma <= 1e-6 {
                continue;
            }
            let voxel_sigma = sigma / spacing[axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let radius = radius.min((MAX_KERNEL_WIDTH - 1) / 2);
            if radius == 0 {
                continue;
            }
            let kernel = gaussian_kernel(voxel_sigma, radius);
            let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = convolve_along(data, kernel, dim, radius);
        }
        data
    }
}

/// Normalized Gaussian taps for offsets `-radius..=radius`.
fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let taps: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|v| (v / sum) as f32).collect()
}

fn convolve_along<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    kernel: Tensor<B, 1>,
    dim: usize,
    radius: usize,
) -> Tensor<B, D> {
    let dims: [usize; D] = input.dims();

    // Move `dim` last and fold the rest into the batch.
    let mut order = [0isize; D];
    let mut next = 0;
    for i in (0..D).filter(|&i| i != dim) {
        order[next] = i as isize;
        next += 1;
    }
    order[D - 1] = dim as isize;
    let mut permuted_shape = [0usize; D];
    for (p, &o) in order.iter().enumerate() {
        permuted_shape[p] = dims[o as usize];
    }
    let len = dims[dim];
    let batch = dims.iter().product::<usize>() / len;

    let lines: Tensor<B, 3> = input.permute(order).reshape([batch, 1, len]);

    // Replicate the border samples.
    let first = lines.clone().narrow(2, 0, 1).repeat(&[1, 1, radius]);
    let last = lines.clone().narrow(2, len - 1, 1).repeat(&[1, 1, radius]);
    let padded = Tensor::cat(vec![first, lines, last], 2);

    let width = 2 * radius + 1;
    let weight = kernel.reshape([1, 1, width]);
    let options = ConvOptions::new([1], [0], [1], 1);
    let smoothed = burn::tensor::module::conv1d(padded, weight, None, options);

    let mut inverse = [0isize; D];
    for (p, &o) in order.iter().enumerate() {
        inverse[o as usize] = p as isize;
    }
    smoothed.reshape(permuted_shape).permute(inverse)
}
