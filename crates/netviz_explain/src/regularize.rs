//! Image-space regularizers applied between class-visualization steps.
//!
//! Random jitter, periodic blurring and clamping to the valid pixel range
//! keep gradient ascent from converging on high-frequency noise.

use burn::prelude::*;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::TensorData;

use netviz_core::{CoreError, ImageNormalization, ImageShape, Result};

/// Kernel radius in standard deviations.
const TRUNCATE: f32 = 4.0;

/// Circularly shift an image batch by `dx` columns and `dy` rows.
///
/// `jitter(jitter(x, dx, dy), -dx, -dy)` is the identity.
pub fn jitter<B: Backend>(images: Tensor<B, 4>, dx: i64, dy: i64) -> Tensor<B, 4> {
    roll(roll(images, dx, 3), dy, 2)
}

fn roll<B: Backend>(tensor: Tensor<B, 4>, shift: i64, dim: usize) -> Tensor<B, 4> {
    let size = tensor.dims()[dim];
    if size == 0 {
        return tensor;
    }
    let shift = shift.rem_euclid(size as i64) as usize;
    if shift == 0 {
        return tensor;
    }
    let head = tensor.clone().narrow(dim, size - shift, shift);
    let tail = tensor.narrow(dim, 0, size - shift);
    Tensor::cat(vec![head, tail], dim)
}

/// Normalized 1D Gaussian kernel truncated at four standard deviations or
/// `max_radius` taps either side of the center, whichever is shorter.
pub fn gaussian_kernel(sigma: f32, max_radius: usize) -> Vec<f32> {
    let radius = ((TRUNCATE * sigma + 0.5) as usize).min(max_radius) as i64;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur over the spatial axes of an image batch.
///
/// Borders are reflected (`d c b a | a b c d | d c b a`), so a constant
/// image is left unchanged. The kernel never reaches further than the larger
/// spatial side of the image.
///
/// # Errors
///
/// Returns an error if `images` is not 4D or `sigma` is not positive and finite.
pub fn gaussian_blur<B: Backend>(images: Tensor<B, 4>, sigma: f32) -> Result<Tensor<B, 4>> {
    let shape = ImageShape::from_dims(&images.dims())?;
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(CoreError::InvalidParameter {
            name: "sigma",
            reason: format!("must be positive and finite, got {sigma}"),
        });
    }

    let kernel = gaussian_kernel(sigma, shape.height().max(shape.width()));
    let blurred = blur_axis(images, &kernel, 2);
    Ok(blur_axis(blurred, &kernel, 3))
}

fn blur_axis<B: Backend>(images: Tensor<B, 4>, kernel: &[f32], dim: usize) -> Tensor<B, 4> {
    let channels = images.dims()[1];
    let padded = reflect_pad(images, kernel.len() / 2, dim);
    let device = padded.device();

    // Depthwise: one copy of the kernel per channel, groups == channels.
    let kernel_shape = if dim == 2 {
        [channels, 1, kernel.len(), 1]
    } else {
        [channels, 1, 1, kernel.len()]
    };
    let weight_data: Vec<f32> = (0..channels).flat_map(|_| kernel.iter().copied()).collect();
    let weight = Tensor::<B, 4>::from_data(TensorData::new(weight_data, kernel_shape), &device);

    conv2d(
        padded,
        weight,
        None,
        ConvOptions::new([1, 1], [0, 0], [1, 1], channels),
    )
}

fn reflect_pad<B: Backend>(tensor: Tensor<B, 4>, radius: usize, dim: usize) -> Tensor<B, 4> {
    let size = tensor.dims()[dim] as i64;
    if radius == 0 || size == 0 {
        return tensor;
    }
    let radius = radius as i64;
    let indices: Vec<i64> = (-radius..size + radius)
        .map(|i| reflect_index(i, size))
        .collect();
    let len = indices.len();
    let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [len]), &tensor.device());
    tensor.select(dim, indices)
}

fn reflect_index(index: i64, size: i64) -> i64 {
    let period = 2 * size;
    let folded = index.rem_euclid(period);
    if folded < size {
        folded
    } else {
        period - 1 - folded
    }
}

/// Clamp every channel to the normalized image of the pixel range `[0, 1]`.
///
/// # Errors
///
/// Returns an error if the channel count differs from the normalization's.
pub fn clamp_pixels<B: Backend>(
    images: Tensor<B, 4>,
    normalization: &ImageNormalization,
) -> Result<Tensor<B, 4>> {
    let shape = ImageShape::from_dims(&images.dims())?;
    normalization.check_channels(&shape)?;

    let channels = normalization
        .pixel_bounds()
        .into_iter()
        .enumerate()
        .map(|(channel, (low, high))| images.clone().narrow(1, channel, 1).clamp(low, high))
        .collect();
    Ok(Tensor::cat(channels, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{values, InnerBackend};
    use burn::tensor::Distribution;

    fn arange(dims: [usize; 4]) -> Tensor<InnerBackend, 4> {
        let n: usize = dims.iter().product();
        let data: Vec<f32> = (0..n).map(|i| i as f32).collect();
        Tensor::<InnerBackend, 1>::from_floats(data.as_slice(), &Default::default()).reshape(dims)
    }

    #[test]
    fn test_jitter_rolls_columns_and_rows() {
        // 1x1x2x3: [[0, 1, 2], [3, 4, 5]]
        let image = arange([1, 1, 2, 3]);

        assert_eq!(values(jitter(image.clone(), 1, 0)), vec![2.0, 0.0, 1.0, 5.0, 3.0, 4.0]);
        assert_eq!(values(jitter(image.clone(), 0, 1)), vec![3.0, 4.0, 5.0, 0.0, 1.0, 2.0]);
        assert_eq!(values(jitter(image.clone(), -1, 0)), vec![1.0, 2.0, 0.0, 4.0, 5.0, 3.0]);
        assert_eq!(values(jitter(image.clone(), 3, 2)), values(image));
    }

    #[test]
    fn test_jitter_round_trip() {
        let image = Tensor::<InnerBackend, 4>::random([1, 3, 6, 5], Distribution::Normal(0.0, 1.0), &Default::default());
        let back = jitter(jitter(image.clone(), 4, -3), -4, 3);
        assert_eq!(values(back), values(image));
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(0.5, 64);
        assert_eq!(kernel.len(), 5);
        assert_eq!(gaussian_kernel(0.5, 1).len(), 3);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
        assert!((kernel[0] - kernel[4]).abs() < 1e-9);
    }

    #[test]
    fn test_reflect_index() {
        let padded: Vec<i64> = (-3..7).map(|i| reflect_index(i, 4)).collect();
        assert_eq!(padded, vec![2, 1, 0, 0, 1, 2, 3, 3, 2, 1]);
        // Radius wider than the axis keeps folding.
        assert_eq!(reflect_index(-5, 2), 0);
    }

    #[test]
    fn test_blur_keeps_constant_image() {
        let image = Tensor::<InnerBackend, 4>::ones([1, 3, 5, 4], &Default::default()) * 0.7;
        let blurred = gaussian_blur(image, 0.5).unwrap();

        assert_eq!(blurred.dims(), [1, 3, 5, 4]);
        assert!(values(blurred).iter().all(|v| (v - 0.7).abs() < 1e-5));
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut data = vec![0.0f32; 25];
        data[12] = 1.0;
        let image = Tensor::<InnerBackend, 1>::from_floats(data.as_slice(), &Default::default())
            .reshape([1, 1, 5, 5]);

        let blurred = values(gaussian_blur(image, 1.0).unwrap());

        assert!(blurred[12] < 1.0);
        assert!(blurred[11] > 0.0 && blurred[13] > 0.0 && blurred[7] > 0.0);
        assert!((blurred[11] - blurred[13]).abs() < 1e-6);
    }

    #[test]
    fn test_blur_with_huge_sigma_is_bounded() {
        assert_eq!(gaussian_kernel(1e12, 3).len(), 7);

        let image = Tensor::<InnerBackend, 4>::ones([1, 2, 3, 2], &Default::default()) * 0.25;
        let blurred = gaussian_blur(image, 1e12).unwrap();

        assert_eq!(blurred.dims(), [1, 2, 3, 2]);
        assert!(values(blurred).iter().all(|v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn test_blur_rejects_bad_sigma() {
        let image = Tensor::<InnerBackend, 4>::zeros([1, 1, 3, 3], &Default::default());
        assert!(gaussian_blur(image.clone(), 0.0).is_err());
        assert!(gaussian_blur(image, f32::NAN).is_err());
    }

    #[test]
    fn test_clamp_pixels() {
        let norm = ImageNormalization::new(vec![0.5, 0.0], vec![0.5, 1.0]).unwrap();
        let image = Tensor::<InnerBackend, 4>::ones([1, 2, 1, 2], &Default::default()) * 3.0
            - Tensor::<InnerBackend, 4>::ones([1, 2, 1, 2], &Default::default()) * 5.0;

        // Every value is -2: channel 0 clamps to -1, channel 1 to 0.
        let clamped = values(clamp_pixels(image, &norm).unwrap());
        assert_eq!(clamped, vec![-1.0, -1.0, 0.0, 0.0]);
    }
}
