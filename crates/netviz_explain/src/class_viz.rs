//! Class visualization by regularized gradient ascent.
//!
//! Starting from noise, push an image towards a high raw score for one class
//! while an L2 penalty keeps its magnitude in check. [`class_visualization_step`]
//! is a single update; [`ClassVisualizer`] wraps it in the usual loop with
//! jitter, clamping and periodic blurring.
//!
//! Reference: Yosinski et al., "Understanding Neural Networks Through Deep
//! Visualization", ICML 2015 Deep Learning Workshop.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use rand::Rng;
use serde::{Deserialize, Serialize};

use netviz_core::{
    validate_class, CoreError, ImageClassifier, ImageNormalization, ImageShape, InferenceMode,
    Result, Seed,
};

use crate::gradient::{class_score, input_gradient, tracked};
use crate::regularize::{clamp_pixels, gaussian_blur, jitter};

/// Perform one step of regularized gradient ascent on `image`.
///
/// The objective is `score[0, target] - l2_reg * ||image||²` and the update
/// is `image + learning_rate * ∇objective`. The classifier runs in inference
/// mode and is restored afterwards.
///
/// # Errors
///
/// Returns an error if `image` is not a single (1, C, H, W) image, the target
/// is not scored by `model`, `l2_reg` is negative or not finite, or
/// `learning_rate` is not positive and finite.
pub fn class_visualization_step<B, M>(
    model: &mut M,
    target: usize,
    l2_reg: f32,
    learning_rate: f32,
    image: Tensor<B::InnerBackend, 4>,
) -> Result<Tensor<B::InnerBackend, 4>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    let shape = ImageShape::from_dims(&image.dims())?;
    shape.require_single()?;
    shape.require_non_empty()?;
    validate_class(target, model.num_classes())?;
    check_step_params(l2_reg, learning_rate)?;

    let model = InferenceMode::<B, M>::enter(model);
    let (image, _) = ascent_step::<B, M>(&model, target, l2_reg, learning_rate, image);
    Ok(image)
}

fn check_step_params(l2_reg: f32, learning_rate: f32) -> Result<()> {
    if !(l2_reg >= 0.0 && l2_reg.is_finite()) {
        return Err(CoreError::InvalidParameter {
            name: "l2_reg",
            reason: format!("must be non-negative and finite, got {l2_reg}"),
        });
    }
    if !(learning_rate > 0.0 && learning_rate.is_finite()) {
        return Err(CoreError::InvalidParameter {
            name: "learning_rate",
            reason: format!("must be positive and finite, got {learning_rate}"),
        });
    }
    Ok(())
}

/// Returns the updated image and the target score of the input image.
fn ascent_step<B, M>(
    model: &M,
    target: usize,
    l2_reg: f32,
    learning_rate: f32,
    image: Tensor<B::InnerBackend, 4>,
) -> (Tensor<B::InnerBackend, 4>, f32)
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    let x = tracked::<B, 4>(image);
    let score = class_score(model.forward(x.clone()), target);
    let score_value: f32 = score.clone().into_scalar().elem();

    let penalty = (x.clone() * x.clone()).sum() * l2_reg;
    let gradient = input_gradient(&x, score - penalty);
    (x.inner() + gradient * learning_rate, score_value)
}

/// Configuration for a full class-visualization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassVisualizationConfig {
    /// Strength of the L2 penalty on the image.
    pub l2_reg: f32,
    /// Gradient ascent step size.
    pub learning_rate: f32,
    /// Number of ascent steps.
    pub num_iterations: usize,
    /// Blur after every this many steps (0 = never).
    pub blur_every: usize,
    /// Standard deviation of the blur kernel, in pixels.
    pub blur_sigma: f32,
    /// Largest random shift applied before each step, in pixels.
    pub max_jitter: usize,
    /// Report progress every this many steps (0 = never).
    pub log_every: usize,
    /// Statistics that define the valid pixel range.
    pub normalization: ImageNormalization,
    /// Seed for the random start and the jitter offsets.
    pub seed: Seed,
}

impl Default for ClassVisualizationConfig {
    fn default() -> Self {
        Self {
            l2_reg: 1e-3,
            learning_rate: 25.0,
            num_iterations: 100,
            blur_every: 10,
            blur_sigma: 0.5,
            max_jitter: 16,
            log_every: 25,
            normalization: ImageNormalization::default(),
            seed: Seed::default(),
        }
    }
}

impl ClassVisualizationConfig {
    /// Set the L2 penalty strength.
    #[must_use]
    pub fn with_l2_reg(mut self, l2_reg: f32) -> Self {
        self.l2_reg = l2_reg;
        self
    }

    /// Set the step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of steps.
    #[must_use]
    pub fn with_num_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Set the blur interval and kernel width.
    #[must_use]
    pub fn with_blur(mut self, every: usize, sigma: f32) -> Self {
        self.blur_every = every;
        self.blur_sigma = sigma;
        self
    }

    /// Set the largest jitter offset.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: usize) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Set the progress interval.
    #[must_use]
    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    /// Set the pixel statistics.
    #[must_use]
    pub fn with_normalization(mut self, normalization: ImageNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = seed.into();
        self
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        check_step_params(self.l2_reg, self.learning_rate)?;
        if self.blur_every > 0 && !(self.blur_sigma > 0.0 && self.blur_sigma.is_finite()) {
            return Err(CoreError::InvalidParameter {
                name: "blur_sigma",
                reason: format!("must be positive and finite, got {}", self.blur_sigma),
            });
        }
        // Re-run the constructor checks on deserialized statistics.
        ImageNormalization::new(self.normalization.mean.clone(), self.normalization.std.clone())?;
        Ok(())
    }
}

/// Result of a class-visualization run.
#[derive(Debug, Clone)]
pub struct ClassVisualization<B: Backend> {
    /// The synthesized image (1, C, H, W), in normalized space.
    pub image: Tensor<B, 4>,
    /// The visualized class.
    pub target: usize,
    /// Number of ascent steps taken.
    pub iterations: usize,
    /// Raw target score of the returned image.
    pub final_score: f32,
}

/// Drives [`class_visualization_step`] with jitter, clamping and blurring.
///
/// # Example
///
/// ```rust,ignore
/// let config = ClassVisualizationConfig::default().with_seed(7);
/// let viz = ClassVisualizer::new(config)?.visualize(&mut model, 76, 224, 224, &device)?;
/// let pixels = ImageNormalization::imagenet().denormalize(viz.image)?;
/// ```
#[derive(Debug, Clone)]
pub struct ClassVisualizer {
    config: ClassVisualizationConfig,
}

impl ClassVisualizer {
    /// Create a visualizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClassVisualizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The run configuration.
    pub fn config(&self) -> &ClassVisualizationConfig {
        &self.config
    }

    /// Standard-normal starting image of shape (1, C, H, W), one channel per
    /// normalization statistic, drawn from the configured seed.
    pub fn initial_image<B: Backend>(
        &self,
        height: usize,
        width: usize,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let channels = self.config.normalization.channels();
        let mut rng = self.config.seed.derive("init").to_rng();
        let noise: Vec<f32> = (0..channels * height * width)
            .map(|_| {
                // Box-Muller; u1 is kept away from zero so ln stays finite.
                let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
                let u2: f32 = rng.gen();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
            })
            .collect();
        Tensor::from_data(TensorData::new(noise, [1, channels, height, width]), device)
    }

    /// Visualize `target` starting from seeded noise of size `height` x `width`.
    pub fn visualize<B, M>(
        &self,
        model: &mut M,
        target: usize,
        height: usize,
        width: usize,
        device: &<B::InnerBackend as Backend>::Device,
    ) -> Result<ClassVisualization<B::InnerBackend>>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B>,
    {
        let image = self.initial_image::<B::InnerBackend>(height, width, device);
        self.visualize_from::<B, M>(model, target, image)
    }

    /// Visualize `target` starting from `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image` is not a single non-empty image with one
    /// channel per normalization statistic, or the target is not scored by
    /// `model`.
    pub fn visualize_from<B, M>(
        &self,
        model: &mut M,
        target: usize,
        image: Tensor<B::InnerBackend, 4>,
    ) -> Result<ClassVisualization<B::InnerBackend>>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B>,
    {
        let shape = ImageShape::from_dims(&image.dims())?;
        shape.require_single()?;
        shape.require_non_empty()?;
        self.config.normalization.check_channels(&shape)?;
        validate_class(target, model.num_classes())?;

        let config = &self.config;
        let model = InferenceMode::<B, M>::enter(model);
        let mut rng = config.seed.derive("jitter").to_rng();
        let max_jitter = config.max_jitter as i64;
        tracing::info!(
            "Visualizing class {} over {} iteration(s) on {}",
            target,
            config.num_iterations,
            shape
        );

        let mut image = image;
        for t in 0..config.num_iterations {
            let dx = rng.gen_range(-max_jitter..=max_jitter);
            let dy = rng.gen_range(-max_jitter..=max_jitter);

            let (stepped, score) = ascent_step::<B, M>(
                &model,
                target,
                config.l2_reg,
                config.learning_rate,
                jitter(image, dx, dy),
            );
            image = clamp_pixels(jitter(stepped, -dx, -dy), &config.normalization)?;
            if config.blur_every > 0 && t % config.blur_every == 0 {
                image = gaussian_blur(image, config.blur_sigma)?;
            }

            if config.log_every > 0 && (t == 0 || (t + 1) % config.log_every == 0) {
                tracing::info!("Iteration {}/{}: target score {:.4}", t + 1, config.num_iterations, score);
            } else {
                tracing::debug!("Iteration {}: jitter ({}, {}), target score {:.4}", t + 1, dx, dy, score);
            }
        }

        let scores = model.forward(Tensor::from_inner(image.clone()));
        let final_score: f32 = class_score(scores, target).into_scalar().elem();

        Ok(ClassVisualization {
            image,
            target,
            iterations: config.num_iterations,
            final_score,
        })
    }
}
