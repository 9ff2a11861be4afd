//! # netviz_core
//!
//! Core types and traits for netviz, a toolkit for looking inside pretrained
//! image classifiers through their input gradients.
//!
//! This crate provides:
//! - [`ImageClassifier`] and the scoped [`InferenceMode`] guard
//! - [`ImageShape`] for image batch shape metadata and label validation
//! - [`ImageNormalization`] for mean/std pixel normalization
//! - [`Seed`] for deterministic random number generation
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image batches follow the convention `(N, C, H, W)`:
//! - `N`: Batch size (number of images)
//! - `C`: Channels
//! - `H`, `W`: Height and width in pixels
//!
//! ## Example
//!
//! ```rust
//! use netviz_core::{ImageShape, Seed};
//!
//! let seed = Seed::new(42);
//! let shape = ImageShape::new(1, 3, 224, 224);
//! assert_eq!(shape.map_dims(), [1, 224, 224]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod model_trait;
mod normalize;
mod seed;
mod shape;

pub use error::{CoreError, Result};
pub use model_trait::{top1, ImageClassifier, InferenceMode, ModelMode};
pub use normalize::{ImageNormalization, IMAGENET_MEAN, IMAGENET_STD};
pub use seed::Seed;
pub use shape::{validate_class, validate_labels, ImageShape};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;
}
