//! Classifier trait and the scoped inference-mode guard.
//!
//! The routines in `netviz_explain` only need three things from a model:
//! a forward pass from images to class scores, the number of classes it
//! scores, and a train/inference switch. [`InferenceMode`] flips the switch
//! for the duration of a borrow and puts the previous mode back on drop, so
//! explaining a model never leaves it in a different state.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

/// Whether training-only stochastic layers (dropout, ...) are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelMode {
    /// Stochastic regularization enabled.
    #[default]
    Training,
    /// Deterministic forward passes.
    Inference,
}

impl ModelMode {
    /// Check for inference mode.
    #[must_use]
    pub const fn is_inference(&self) -> bool {
        matches!(self, Self::Inference)
    }
}

/// A pretrained image classifier that can be differentiated w.r.t. its input.
///
/// Implementors live on an autodiff backend so that gradients can flow from
/// the class scores back to the pixels.
pub trait ImageClassifier<B: AutodiffBackend> {
    /// Forward pass returning raw (unnormalized) class scores.
    ///
    /// # Arguments
    ///
    /// * `images` - Input tensor of shape (N, C, H, W)
    ///
    /// # Returns
    ///
    /// Scores tensor of shape (N, num_classes)
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Number of classes scored by [`forward`](Self::forward).
    fn num_classes(&self) -> usize;

    /// Current train/inference mode.
    fn mode(&self) -> ModelMode;

    /// Switch the train/inference mode.
    fn set_mode(&mut self, mode: ModelMode);

    /// Top-1 class per image.
    fn predict(&self, images: Tensor<B, 4>) -> Vec<usize> {
        top1(self.forward(images))
    }
}

/// Row-wise argmax of a score matrix.
pub fn top1<B: Backend>(scores: Tensor<B, 2>) -> Vec<usize> {
    scores
        .argmax(1)
        .into_data()
        .iter::<i64>()
        .map(|class| class as usize)
        .collect()
}

/// Borrow of a classifier switched to [`ModelMode::Inference`].
///
/// The previous mode is restored when the guard is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let scores = {
///     let guard = InferenceMode::enter(&mut model);
///     guard.forward(images)
/// };
/// // `model` is back in whatever mode it was in before.
/// ```
pub struct InferenceMode<'a, B: AutodiffBackend, M: ImageClassifier<B>> {
    model: &'a mut M,
    previous: ModelMode,
    _backend: PhantomData<B>,
}

impl<'a, B: AutodiffBackend, M: ImageClassifier<B>> InferenceMode<'a, B, M> {
    /// Switch `model` to inference mode until the guard is dropped.
    pub fn enter(model: &'a mut M) -> Self {
        let previous = model.mode();
        model.set_mode(ModelMode::Inference);
        Self {
            model,
            previous,
            _backend: PhantomData,
        }
    }

    /// The mode that will be restored on drop.
    #[must_use]
    pub const fn previous(&self) -> ModelMode {
        self.previous
    }
}

impl<B: AutodiffBackend, M: ImageClassifier<B>> Deref for InferenceMode<'_, B, M> {
    type Target = M;

    fn deref(&self) -> &Self::Target {
        self.model
    }
}

impl<B: AutodiffBackend, M: ImageClassifier<B>> DerefMut for InferenceMode<'_, B, M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.model
    }
}

impl<B: AutodiffBackend, M: ImageClassifier<B>> Drop for InferenceMode<'_, B, M> {
    fn drop(&mut self) {
        self.model.set_mode(self.previous);
    }
}
