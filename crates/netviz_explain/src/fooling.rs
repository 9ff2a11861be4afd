//! Fooling images.
//!
//! Starting from a correctly classified image, repeatedly step along the
//! normalized gradient of the target class's raw score until the classifier
//! predicts the target. The perturbation stays small because every step has
//! length `learning_rate` and the loop stops at the first fooled prediction.
//!
//! [`FoolingSteps`] is the loop as a lazy iterator: one item per evaluated
//! image, nothing logged. [`make_fooling_image`] drives it to completion and
//! reports progress through `tracing`.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use netviz_core::{
    top1, validate_class, CoreError, ImageClassifier, ImageShape, InferenceMode, Result,
};

use crate::gradient::{class_score, input_gradient, l2_norm, tracked};

/// Configuration for fooling-image synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoolingConfig {
    /// Length of every update step (the gradient is L2-normalized first).
    pub learning_rate: f32,
    /// Report progress every this many iterations (0 = never).
    pub log_every: usize,
    /// Give up after this many updates. `None` runs until the target is reached.
    pub max_iters: Option<usize>,
}

impl Default for FoolingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            log_every: 10,
            max_iters: None,
        }
    }
}

impl FoolingConfig {
    /// Set the step length.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the progress interval.
    #[must_use]
    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    /// Cap the number of updates.
    #[must_use]
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = Some(max_iters);
        self
    }

    /// Check that the configuration can drive the loop.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CoreError::InvalidParameter {
                name: "learning_rate",
                reason: format!("must be positive and finite, got {}", self.learning_rate),
            });
        }
        Ok(())
    }
}

/// One evaluated image of the fooling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoolingStep {
    /// Number of updates applied to the evaluated image.
    pub iteration: usize,
    /// Top-1 prediction for the evaluated image.
    pub predicted: usize,
    /// Raw score of the target class for the evaluated image.
    pub target_score: f32,
    /// Whether the evaluated image is classified as the target.
    pub reached: bool,
}

/// Lazy fooling loop.
///
/// Holds the classifier in inference mode until dropped. Each call to
/// `next` evaluates the current image and, unless it is already classified
/// as the target, applies one update. The iterator ends after the first
/// record with `reached == true` or after the first error.
pub struct FoolingSteps<'a, B: AutodiffBackend, M: ImageClassifier<B>> {
    model: InferenceMode<'a, B, M>,
    original: Tensor<B::InnerBackend, 4>,
    current: Tensor<B::InnerBackend, 4>,
    target: usize,
    config: FoolingConfig,
    iteration: usize,
    finished: bool,
}

impl<'a, B, M> FoolingSteps<'a, B, M>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    /// Start a fooling loop from `image` towards `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image` is not a single (1, C, H, W) image, the
    /// target is not scored by `model`, or the configuration is invalid.
    pub fn new(
        image: Tensor<B::InnerBackend, 4>,
        target: usize,
        model: &'a mut M,
        config: FoolingConfig,
    ) -> Result<Self> {
        let shape = ImageShape::from_dims(&image.dims())?;
        shape.require_single()?;
        shape.require_non_empty()?;
        validate_class(target, model.num_classes())?;
        config.validate()?;

        Ok(Self {
            model: InferenceMode::enter(model),
            current: image.clone(),
            original: image,
            target,
            config,
            iteration: 0,
            finished: false,
        })
    }

    /// The target class.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Number of updates applied so far.
    pub fn iterations(&self) -> usize {
        self.iteration
    }

    /// The current working image.
    pub fn image(&self) -> Tensor<B::InnerBackend, 4> {
        self.current.clone()
    }

    /// Consume the loop and return the current working image.
    pub fn into_image(self) -> Tensor<B::InnerBackend, 4> {
        self.current
    }

    /// Go back to the starting image and iteration zero.
    pub fn restart(&mut self) {
        self.current = self.original.clone();
        self.iteration = 0;
        self.finished = false;
    }

    fn advance(&mut self) -> Result<FoolingStep> {
        let x = tracked::<B, 4>(self.current.clone());
        let scores = self.model.forward(x.clone());

        let predicted = top1(scores.clone().inner())
            .first()
            .copied()
            .ok_or_else(|| CoreError::Other("classifier returned no scores".to_string()))?;
        let score = class_score(scores, self.target);
        let step = FoolingStep {
            iteration: self.iteration,
            predicted,
            target_score: score.clone().into_scalar().elem(),
            reached: predicted == self.target,
        };
        if step.reached {
            return Ok(step);
        }

        if let Some(max_iters) = self.config.max_iters {
            if self.iteration >= max_iters {
                return Err(CoreError::TargetNotReached {
                    target: self.target,
                    iterations: self.iteration,
                    predicted,
                });
            }
        }

        let gradient = input_gradient(&x, score);
        let norm = l2_norm(gradient.clone());
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(CoreError::VanishingGradient {
                iteration: self.iteration,
            });
        }

        self.current = self.current.clone() + gradient * (self.config.learning_rate / norm);
        self.iteration += 1;
        Ok(step)
    }
}

impl<B, M> Iterator for FoolingSteps<'_, B, M>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    type Item = Result<FoolingStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let outcome = self.advance();
        if !matches!(outcome, Ok(FoolingStep { reached: false, .. })) {
            self.finished = true;
        }
        Some(outcome)
    }
}

/// A synthesized fooling image.
#[derive(Debug, Clone)]
pub struct FoolingImage<B: Backend> {
    /// The perturbed image (1, C, H, W).
    pub image: Tensor<B, 4>,
    /// Number of updates applied.
    pub iterations: usize,
    /// Record of the returned image: its prediction and target score.
    pub final_step: FoolingStep,
}

impl<B: Backend> FoolingImage<B> {
    /// L2 distance between the fooling image and `original`.
    pub fn distance_from(&self, original: Tensor<B, 4>) -> f32 {
        l2_norm(self.image.clone() - original)
    }

    /// The magnified difference `(image - original) * scale`, for display.
    pub fn perturbation(&self, original: Tensor<B, 4>, scale: f32) -> Tensor<B, 4> {
        (self.image.clone() - original) * scale
    }
}

/// Generate an image close to `image` that `model` classifies as `target`.
///
/// Logs the target score and prediction every `config.log_every` iterations
/// and once when the target is reached.
///
/// # Errors
///
/// Besides the argument checks of [`FoolingSteps::new`], returns
/// [`CoreError::TargetNotReached`] when `config.max_iters` is exhausted and
/// [`CoreError::VanishingGradient`] when the target score stops depending on
/// the image. Without a cap the loop runs until the target is predicted.
///
/// # Example
///
/// ```rust,ignore
/// let config = FoolingConfig::default().with_max_iters(100);
/// let fooled = make_fooling_image(image, 6, &mut model, &config)?;
/// assert_eq!(fooled.final_step.predicted, 6);
/// ```
pub fn make_fooling_image<B, M>(
    image: Tensor<B::InnerBackend, 4>,
    target: usize,
    model: &mut M,
    config: &FoolingConfig,
) -> Result<FoolingImage<B::InnerBackend>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    let mut steps = FoolingSteps::<B, M>::new(image, target, model, config.clone())?;
    tracing::info!("Synthesizing fooling image for target class {}", target);

    let mut final_step = None;
    for step in steps.by_ref() {
        let step = step?;
        if step.reached {
            final_step = Some(step);
            break;
        }
        if config.log_every > 0 && step.iteration % config.log_every == 0 {
            tracing::info!(
                "Iteration {}: target score {:.4}, predicted class {}",
                step.iteration,
                step.target_score,
                step.predicted
            );
        }
    }

    let final_step = final_step
        .ok_or_else(|| CoreError::Other("fooling loop ended without reaching the target".to_string()))?;
    tracing::info!(
        "Target class {} reached in {} iteration(s), target score {:.4}",
        target,
        final_step.iteration,
        final_step.target_score
    );

    Ok(FoolingImage {
        image: steps.into_image(),
        iterations: final_step.iteration,
        final_step,
    })
}
