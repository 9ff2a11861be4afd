//! # netviz
//!
//! Look inside pretrained image classifiers through their input gradients.
//!
//! - **Saliency maps**: per-pixel sensitivity of the loss of the correct class
//! - **Fooling images**: minimal perturbations that flip a prediction to a chosen class
//! - **Class visualization**: images synthesized to maximize a single class score
//!
//! Any model implementing [`core::ImageClassifier`] on an autodiff backend
//! can be explained.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netviz::prelude::*;
//!
//! type B = Autodiff<NdArray>;
//!
//! let saliency = compute_saliency_maps::<B, _>(images, &labels, &mut model)?;
//!
//! let config = FoolingConfig::default().with_max_iters(100);
//! let fooled = make_fooling_image::<B, _>(image, 6, &mut model, &config)?;
//!
//! let viz = ClassVisualizer::new(ClassVisualizationConfig::default())?
//!     .visualize::<B, _>(&mut model, 76, 224, 224, &device)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray, with autodiff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use netviz_core as core;
pub use netviz_explain as explain;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use netviz::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use netviz_core::{
        CoreError, ImageClassifier, ImageNormalization, ImageShape, InferenceMode, ModelMode,
        Result, Seed,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use netviz_core::backend::{Autodiff, NdArray};

    // Explain
    pub use netviz_explain::{
        class_visualization_step, compute_saliency_maps, make_fooling_image,
        ClassVisualizationConfig, ClassVisualizer, FoolingConfig, FoolingImage, SaliencyMap,
    };
}
