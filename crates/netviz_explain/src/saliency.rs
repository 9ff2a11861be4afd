//! Class saliency maps.
//!
//! A saliency map scores every pixel by how strongly the classification loss
//! reacts to it: the absolute input gradient of the cross-entropy loss,
//! reduced by a maximum over the color channels.
//!
//! Reference: Simonyan et al., "Deep Inside Convolutional Networks:
//! Visualising Image Classification Models and Saliency Maps", ICLR 2014.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

use netviz_core::{validate_labels, ImageClassifier, ImageShape, InferenceMode, Result};

use crate::gradient::{input_gradient, tracked};

/// Saliency maps for a batch of images.
#[derive(Debug, Clone)]
pub struct SaliencyMap<B: Backend> {
    /// Per-pixel saliency of shape (N, H, W).
    pub values: Tensor<B, 3>,
    /// The labels the loss was computed against.
    pub labels: Vec<usize>,
}

impl<B: Backend> SaliencyMap<B> {
    /// Create a new saliency map.
    pub fn new(values: Tensor<B, 3>, labels: Vec<usize>) -> Self {
        Self { values, labels }
    }

    /// Get the shape of the saliency map.
    pub fn shape(&self) -> [usize; 3] {
        self.values.dims()
    }

    /// Rescale every map independently to [0, 1].
    ///
    /// A constant map becomes all zeros.
    pub fn normalize(&self) -> Self {
        let [n, h, w] = self.shape();
        let flat = self.values.clone().reshape([n, h * w]);
        let min = flat.clone().min_dim(1).reshape([n, 1, 1]);
        let max = flat.max_dim(1).reshape([n, 1, 1]);
        let range = (max - min.clone()).clamp_min(1e-8);

        Self {
            values: (self.values.clone() - min) / range,
            labels: self.labels.clone(),
        }
    }

    /// Largest saliency value of each image.
    pub fn max_per_image(&self) -> Vec<f32> {
        let [n, h, w] = self.shape();
        self.values
            .clone()
            .reshape([n, h * w])
            .max_dim(1)
            .into_data()
            .iter::<f32>()
            .collect()
    }
}

/// Reduce input gradients of shape (N, C, H, W) to saliency of shape (N, H, W).
///
/// Takes the absolute value and the maximum over channels.
pub fn saliency_from_gradients<B: Backend>(gradients: Tensor<B, 4>) -> Tensor<B, 3> {
    gradients.abs().max_dim(1).squeeze::<3>(1)
}

/// Compute class saliency maps for `images` against their correct `labels`.
///
/// The model is switched to inference mode for the forward pass and restored
/// afterwards. The loss is the batch-mean cross-entropy of the raw scores.
///
/// # Arguments
///
/// * `images` - Input images (N, C, H, W)
/// * `labels` - Correct class of every image
/// * `model` - The classifier to explain
///
/// # Errors
///
/// Returns an error for a non-4D or empty batch, a label count different
/// from `N`, or a label the classifier does not score.
///
/// # Example
///
/// ```rust,ignore
/// let saliency = compute_saliency_maps(images, &[281, 2], &mut model)?;
/// assert_eq!(saliency.shape(), [2, 224, 224]);
/// ```
pub fn compute_saliency_maps<B, M>(
    images: Tensor<B::InnerBackend, 4>,
    labels: &[usize],
    model: &mut M,
) -> Result<SaliencyMap<B::InnerBackend>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    let shape = ImageShape::from_dims(&images.dims())?;
    shape.require_non_empty()?;
    validate_labels(labels, &shape, model.num_classes())?;

    let model = InferenceMode::<B, M>::enter(model);
    let x = tracked::<B, 4>(images);
    let device = x.device();

    let scores = model.forward(x.clone());
    let targets = label_tensor::<B>(labels, &device);
    let loss = CrossEntropyLossConfig::new()
        .init(&device)
        .forward(scores, targets);

    let gradients = input_gradient(&x, loss);
    let saliency = SaliencyMap::new(saliency_from_gradients(gradients), labels.to_vec());

    tracing::debug!("Computed saliency maps for {} image(s) of shape {}", shape.batch(), shape);
    Ok(saliency)
}

fn label_tensor<B: Backend>(labels: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
    Tensor::from_data(TensorData::new(data, [labels.len()]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{values, ConstantScorer, InnerBackend, LinearScorer, TestBackend};
    use burn::tensor::Distribution;
    use netviz_core::{CoreError, ModelMode};

    fn ramp_scorer(features: usize, classes: usize) -> LinearScorer {
        let weight = (0..features * classes)
            .map(|i| ((i * 7919) % 23) as f32 / 23.0 - 0.5)
            .collect();
        LinearScorer::new(weight, vec![0.0; classes], features)
    }

    #[test]
    fn test_saliency_shape_and_sign() {
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::random([2, 3, 5, 4], Distribution::Normal(0.0, 1.0), &device);
        let mut model = ramp_scorer(3 * 5 * 4, 6);

        let saliency = compute_saliency_maps::<TestBackend, _>(images, &[1, 4], &mut model).unwrap();

        assert_eq!(saliency.shape(), [2, 5, 4]);
        assert_eq!(saliency.labels, vec![1, 4]);
        assert!(values(saliency.values).iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_saliency_closed_form_for_sum_scorer() {
        // Zero images give uniform softmax p = 1/3; the loss gradient at every
        // pixel is sum_k (p_k - [k == y]) * w_k, divided by N for the batch mean:
        // (2 - 1) / 2 for label 0 and (2 - 2) / 2 for label 1.
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::zeros([2, 3, 4, 4], &device);
        let mut model = LinearScorer::sum_scorer(&[1.0, 2.0, 3.0], 3 * 4 * 4);

        let saliency = compute_saliency_maps::<TestBackend, _>(images, &[0, 1], &mut model).unwrap();
        let flat = values(saliency.values);

        let (first, second) = flat.split_at(16);
        assert!(first.iter().all(|v| (v - 0.5).abs() < 1e-5), "{first:?}");
        assert!(second.iter().all(|v| v.abs() < 1e-5), "{second:?}");
    }

    #[test]
    fn test_saliency_zero_for_constant_model() {
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::ones([1, 3, 4, 4], &device);
        let mut model = ConstantScorer {
            scores: vec![0.2, 0.8],
            mode: ModelMode::Training,
        };

        let saliency = compute_saliency_maps::<TestBackend, _>(images, &[1], &mut model).unwrap();

        assert_eq!(saliency.shape(), [1, 4, 4]);
        assert!(values(saliency.values).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_saliency_is_deterministic() {
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::random([1, 3, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let mut model = ramp_scorer(48, 4);

        let first = compute_saliency_maps::<TestBackend, _>(images.clone(), &[3], &mut model).unwrap();
        let second = compute_saliency_maps::<TestBackend, _>(images, &[3], &mut model).unwrap();

        assert_eq!(values(first.values), values(second.values));
    }

    #[test]
    fn test_saliency_runs_in_inference_mode() {
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::zeros([1, 3, 2, 2], &device);
        let mut model = ramp_scorer(12, 3);

        compute_saliency_maps::<TestBackend, _>(images, &[0], &mut model).unwrap();

        assert_eq!(*model.seen_modes.borrow(), vec![ModelMode::Inference]);
        assert_eq!(model.mode(), ModelMode::Training);
    }

    #[test]
    fn test_saliency_rejects_bad_labels() {
        let device = Default::default();
        let images = Tensor::<InnerBackend, 4>::zeros([2, 3, 2, 2], &device);
        let mut model = ramp_scorer(12, 3);

        assert!(matches!(
            compute_saliency_maps::<TestBackend, _>(images.clone(), &[0], &mut model),
            Err(CoreError::ShapeMismatch(_))
        ));
        assert!(matches!(
            compute_saliency_maps::<TestBackend, _>(images, &[0, 3], &mut model),
            Err(CoreError::ClassOutOfRange { class: 3, .. })
        ));
        assert!(model.seen_modes.borrow().is_empty());
    }

    #[test]
    fn test_saliency_from_gradients() {
        let device = Default::default();
        // (1, 2, 1, 2): channel 0 = [1, -5], channel 1 = [-3, 2]
        let gradients =
            Tensor::<InnerBackend, 1>::from_floats([1.0, -5.0, -3.0, 2.0], &device).reshape([1, 2, 1, 2]);

        let saliency = saliency_from_gradients(gradients);

        assert_eq!(saliency.dims(), [1, 1, 2]);
        assert_eq!(values(saliency), vec![3.0, 5.0]);
    }

    #[test]
    fn test_normalize_and_max_per_image() {
        let device = Default::default();
        let raw = Tensor::<InnerBackend, 1>::from_floats([0.0, 2.0, 4.0, 1.0, 1.0, 1.0], &device)
            .reshape([2, 1, 3]);
        let map = SaliencyMap::new(raw, vec![0, 1]);

        assert_eq!(map.max_per_image(), vec![4.0, 1.0]);

        let normalized = values(map.normalize().values);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0, 0.0, 0.0, 0.0]);
    }
}
