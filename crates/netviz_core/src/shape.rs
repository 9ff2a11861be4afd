//! Image batch shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape metadata for image batches.
///
/// Follows the convention `(N, C, H, W)`:
/// - `N`: Batch size (number of images)
/// - `C`: Channels (3 for RGB)
/// - `H`: Height in pixels
/// - `W`: Width in pixels
///
/// # Example
///
/// ```rust
/// use netviz_core::ImageShape;
///
/// let shape = ImageShape::new(1, 3, 224, 224);
/// assert_eq!(shape.channels(), 3);
/// assert_eq!(shape.pixels(), 224 * 224);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageShape {
    /// Create a new shape with the specified dimensions.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Create an ImageShape from a slice of dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    ///
    /// ```rust
    /// use netviz_core::ImageShape;
    ///
    /// assert!(ImageShape::from_dims(&[2, 3, 8, 8]).is_ok());
    /// assert!(ImageShape::from_dims(&[3, 8, 8]).is_err());
    /// ```
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match *dims {
            [batch, channels, height, width] => Ok(Self::new(batch, channels, height, width)),
            _ => Err(CoreError::DimensionError {
                expected: 4,
                got: dims.len(),
            }),
        }
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Get the image height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the image width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of pixels per image and channel.
    #[must_use]
    pub const fn pixels(&self) -> usize {
        self.height * self.width
    }

    /// Total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    /// The `(N, H, W)` shape of a per-pixel map over this batch.
    #[must_use]
    pub const fn map_dims(&self) -> [usize; 3] {
        [self.batch, self.height, self.width]
    }

    /// Create a new shape with a different batch size.
    #[must_use]
    pub const fn with_batch(&self, batch: usize) -> Self {
        Self { batch, ..*self }
    }

    /// Require a single-image batch, as the ascent routines score `[0, target]`.
    pub fn require_single(&self) -> Result<()> {
        if self.batch != 1 {
            return Err(CoreError::InvalidShape {
                expected: "(N=1, C, H, W)".to_string(),
                got: self.to_string(),
            });
        }
        Ok(())
    }

    /// Require a non-empty batch.
    pub fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(CoreError::InvalidShape {
                expected: "non-empty image batch".to_string(),
                got: self.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(N={}, C={}, H={}, W={})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

impl From<[usize; 4]> for ImageShape {
    fn from([batch, channels, height, width]: [usize; 4]) -> Self {
        Self::new(batch, channels, height, width)
    }
}

/// Check that a class index is scored by a classifier with `num_classes` outputs.
pub fn validate_class(class: usize, num_classes: usize) -> Result<()> {
    if class >= num_classes {
        return Err(CoreError::ClassOutOfRange { class, num_classes });
    }
    Ok(())
}

/// Check one label per image, each within `[0, num_classes)`.
pub fn validate_labels(labels: &[usize], shape: &ImageShape, num_classes: usize) -> Result<()> {
    if labels.len() != shape.batch() {
        return Err(CoreError::ShapeMismatch(format!(
            "{} labels for a batch of {} images",
            labels.len(),
            shape.batch()
        )));
    }
    labels
        .iter()
        .try_for_each(|&label| validate_class(label, num_classes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_creation() {
        let shape = ImageShape::new(2, 3, 224, 224);
        assert_eq!(shape.batch(), 2);
        assert_eq!(shape.channels(), 3);
        assert_eq!(shape.height(), 224);
        assert_eq!(shape.width(), 224);
        assert_eq!(shape.map_dims(), [2, 224, 224]);
    }

    #[test]
    fn test_shape_from_dims() {
        let shape = ImageShape::from_dims(&[4, 3, 8, 6]).unwrap();
        assert_eq!(shape.as_array(), [4, 3, 8, 6]);

        assert!(matches!(
            ImageShape::from_dims(&[4, 3, 8]),
            Err(CoreError::DimensionError { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_shape_numel_and_empty() {
        assert_eq!(ImageShape::new(2, 3, 4, 5).numel(), 120);
        assert!(ImageShape::new(0, 3, 4, 5).is_empty());
        assert!(ImageShape::new(1, 3, 4, 5).require_non_empty().is_ok());
        assert!(ImageShape::new(1, 3, 0, 5).require_non_empty().is_err());
    }

    #[test]
    fn test_require_single() {
        assert!(ImageShape::new(1, 3, 4, 4).require_single().is_ok());
        assert!(ImageShape::new(2, 3, 4, 4).require_single().is_err());
        assert_eq!(ImageShape::new(2, 3, 4, 4).with_batch(1).batch(), 1);
    }

    #[test]
    fn test_validate_labels() {
        let shape = ImageShape::new(2, 3, 4, 4);
        assert!(validate_labels(&[0, 4], &shape, 5).is_ok());
        assert!(matches!(
            validate_labels(&[0], &shape, 5),
            Err(CoreError::ShapeMismatch(_))
        ));
        assert!(matches!(
            validate_labels(&[0, 5], &shape, 5),
            Err(CoreError::ClassOutOfRange { class: 5, num_classes: 5 })
        ));
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(
            ImageShape::new(1, 3, 224, 224).to_string(),
            "(N=1, C=3, H=224, W=224)"
        );
    }

    #[test]
    fn test_shape_serialization() {
        let shape = ImageShape::new(1, 3, 224, 224);
        let json = serde_json::to_string(&shape).unwrap();
        let restored: ImageShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, restored);
    }
}
