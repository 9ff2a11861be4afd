//! Error types for netviz_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by netviz operations before or while driving a classifier.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between tensors or between a tensor and its labels.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Dimension error.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// A class index outside `[0, num_classes)`.
    #[error("Class index {class} out of range for a classifier with {num_classes} classes")]
    ClassOutOfRange {
        /// The offending class index.
        class: usize,
        /// Number of classes the classifier scores.
        num_classes: usize,
    },

    /// A hyper-parameter that cannot drive an optimization step.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The iteration cap was exhausted before the classifier predicted the target.
    #[error("Target class {target} not reached after {iterations} iterations (last prediction: {predicted})")]
    TargetNotReached {
        /// The requested class.
        target: usize,
        /// Number of gradient updates applied.
        iterations: usize,
        /// Prediction for the last evaluated image.
        predicted: usize,
    },

    /// The objective gradient vanished, so no ascent direction exists.
    #[error("Gradient vanished at iteration {iteration}: the target score does not depend on the image")]
    VanishingGradient {
        /// Number of updates applied before the gradient vanished.
        iteration: usize,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
