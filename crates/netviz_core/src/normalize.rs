//! Per-channel pixel normalization.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// Per-channel RGB mean of the ImageNet training set.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel RGB standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Mean/std normalization applied to pixels in `[0, 1]` before they reach
/// a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageNormalization {
    /// Per-channel mean.
    pub mean: Vec<f32>,
    /// Per-channel standard deviation.
    pub std: Vec<f32>,
}

impl Default for ImageNormalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl ImageNormalization {
    /// Create a normalization from per-channel statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors differ in length, are empty, or any
    /// standard deviation is not strictly positive.
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.is_empty() || mean.len() != std.len() {
            return Err(CoreError::ShapeMismatch(format!(
                "{} means for {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        if let Some(bad) = std.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
            return Err(CoreError::InvalidParameter {
                name: "std",
                reason: format!("standard deviation must be positive and finite, got {bad}"),
            });
        }
        Ok(Self { mean, std })
    }

    /// ImageNet statistics.
    #[must_use]
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
        }
    }

    /// Number of channels covered.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Normalized values of the pixel range `[0, 1]`, one `(low, high)` pair per channel.
    #[must_use]
    pub fn pixel_bounds(&self) -> Vec<(f32, f32)> {
        self.mean
            .iter()
            .zip(&self.std)
            .map(|(m, s)| (-m / s, (1.0 - m) / s))
            .collect()
    }

    /// Map `[0, 1]` pixels to the classifier's input space.
    pub fn normalize<B: Backend>(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let (mean, std) = self.broadcast_stats(&images)?;
        Ok((images - mean) / std)
    }

    /// Map classifier inputs back to `[0, 1]` pixels.
    pub fn denormalize<B: Backend>(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let (mean, std) = self.broadcast_stats(&images)?;
        Ok(images * std + mean)
    }

    fn broadcast_stats<B: Backend>(
        &self,
        images: &Tensor<B, 4>,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let shape = ImageShape::from_dims(&images.dims())?;
        self.check_channels(&shape)?;

        let device = images.device();
        let channels = self.channels();
        let mean = Tensor::<B, 1>::from_floats(self.mean.as_slice(), &device).reshape([1, channels, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(self.std.as_slice(), &device).reshape([1, channels, 1, 1]);
        Ok((mean, std))
    }

    /// Check that an image batch has one channel per statistic.
    pub fn check_channels(&self, shape: &ImageShape) -> Result<()> {
        if shape.channels() != self.channels() {
            return Err(CoreError::ShapeMismatch(format!(
                "normalization has {} channels, images {}",
                self.channels(),
                shape
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    #[test]
    fn test_imagenet_default() {
        let norm = ImageNormalization::default();
        assert_eq!(norm.channels(), 3);
        assert_eq!(norm.mean, IMAGENET_MEAN.to_vec());
    }

    #[test]
    fn test_new_rejects_bad_stats() {
        assert!(ImageNormalization::new(vec![0.5], vec![0.5, 0.5]).is_err());
        assert!(ImageNormalization::new(vec![], vec![]).is_err());
        assert!(ImageNormalization::new(vec![0.5], vec![0.0]).is_err());
        assert!(ImageNormalization::new(vec![0.5], vec![0.25]).is_ok());
    }

    #[test]
    fn test_pixel_bounds() {
        let norm = ImageNormalization::new(vec![0.5, 0.0], vec![0.5, 2.0]).unwrap();
        let bounds = norm.pixel_bounds();
        assert_eq!(bounds, vec![(-1.0, 1.0), (0.0, 0.5)]);
    }

    #[test]
    fn test_normalize_denormalize() {
        let device = Default::default();
        let norm = ImageNormalization::imagenet();
        let pixels = Tensor::<NdArray, 4>::ones([2, 3, 4, 4], &device) * 0.5;

        let normalized = norm.normalize(pixels.clone()).unwrap();
        let first: f32 = normalized.clone().slice([0..1, 0..1, 0..1, 0..1]).into_scalar().elem();
        assert!((first - (0.5 - 0.485) / 0.229).abs() < 1e-5);

        let restored = norm.denormalize(normalized).unwrap();
        let err: f32 = (restored - pixels).abs().max().into_scalar().elem();
        assert!(err < 1e-5);
    }

    #[test]
    fn test_normalize_channel_mismatch() {
        let device = Default::default();
        let norm = ImageNormalization::imagenet();
        let gray = Tensor::<NdArray, 4>::zeros([1, 1, 4, 4], &device);
        assert!(norm.normalize(gray).is_err());
    }
}
