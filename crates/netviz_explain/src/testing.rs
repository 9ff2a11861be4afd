//! Classifier fixtures for unit tests.

use std::cell::RefCell;

use burn::prelude::*;
use netviz_core::backend::{Autodiff, NdArray};
use netviz_core::{ImageClassifier, ModelMode};

pub(crate) type InnerBackend = NdArray;
pub(crate) type TestBackend = Autodiff<NdArray>;

/// Linear scorer: `scores = flatten(x) · W + b`.
///
/// Records the mode it was in at every forward pass.
pub(crate) struct LinearScorer {
    weight: Tensor<TestBackend, 2>,
    bias: Tensor<TestBackend, 1>,
    classes: usize,
    mode: ModelMode,
    pub(crate) seen_modes: RefCell<Vec<ModelMode>>,
}

impl LinearScorer {
    /// `weight` is row-major `[features, classes]`.
    pub(crate) fn new(weight: Vec<f32>, bias: Vec<f32>, features: usize) -> Self {
        let classes = bias.len();
        let device = Default::default();
        Self {
            weight: Tensor::<TestBackend, 1>::from_floats(weight.as_slice(), &device)
                .reshape([features, classes]),
            bias: Tensor::<TestBackend, 1>::from_floats(bias.as_slice(), &device),
            classes,
            mode: ModelMode::Training,
            seen_modes: RefCell::new(Vec::new()),
        }
    }

    /// Class `k` scores `class_weights[k] * sum(x)`.
    pub(crate) fn sum_scorer(class_weights: &[f32], features: usize) -> Self {
        let weight = (0..features)
            .flat_map(|_| class_weights.iter().copied())
            .collect();
        Self::new(weight, vec![0.0; class_weights.len()], features)
    }
}

impl ImageClassifier<TestBackend> for LinearScorer {
    fn forward(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
        self.seen_modes.borrow_mut().push(self.mode);
        let [n, c, h, w] = images.dims();
        images.reshape([n, c * h * w]).matmul(self.weight.clone()) + self.bias.clone().unsqueeze::<2>()
    }

    fn num_classes(&self) -> usize {
        self.classes
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }
}

/// Scores that ignore the input entirely.
pub(crate) struct ConstantScorer {
    pub(crate) scores: Vec<f32>,
    pub(crate) mode: ModelMode,
}

impl ImageClassifier<TestBackend> for ConstantScorer {
    fn forward(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
        let [n, _, _, _] = images.dims();
        Tensor::<TestBackend, 1>::from_floats(self.scores.as_slice(), &images.device())
            .reshape([1, self.scores.len()])
            .repeat_dim(0, n)
    }

    fn num_classes(&self) -> usize {
        self.scores.len()
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }
}

/// Flatten a tensor into host values.
pub(crate) fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}
