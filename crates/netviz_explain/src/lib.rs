//! # netviz_explain
//!
//! Gradient-based explanations for image classifiers.
//!
//! Every routine differentiates a classifier's output with respect to its
//! input image rather than its weights:
//!
//! - [`saliency`]: which pixels the loss of the correct class is most sensitive to
//! - [`fooling`]: small perturbations that flip the prediction to a chosen class
//! - [`class_viz`]: images synthesized from noise to maximize one class score
//! - [`regularize`]: jitter, blur and clamping used between ascent steps
//!
//! Models are run through [`netviz_core::InferenceMode`], so dropout and
//! similar layers are disabled for the duration of a call and the model's
//! previous mode is restored afterwards.
//!
//! ## Example
//!
//! ```rust,ignore
//! use netviz_explain::{compute_saliency_maps, make_fooling_image, FoolingConfig};
//!
//! let saliency = compute_saliency_maps(images, &labels, &mut model)?;
//! let fooled = make_fooling_image(image, 6, &mut model, &FoolingConfig::default())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class_viz;
pub mod fooling;
mod gradient;
pub mod regularize;
pub mod saliency;

#[cfg(test)]
mod testing;

pub use class_viz::{
    class_visualization_step, ClassVisualization, ClassVisualizationConfig, ClassVisualizer,
};
pub use fooling::{make_fooling_image, FoolingConfig, FoolingImage, FoolingStep, FoolingSteps};
pub use regularize::{clamp_pixels, gaussian_blur, gaussian_kernel, jitter};
pub use saliency::{compute_saliency_maps, saliency_from_gradients, SaliencyMap};
