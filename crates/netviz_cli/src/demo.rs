//! Seeded toy classifier and inputs for the command-line demos.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;

use netviz_core::{ImageClassifier, ImageNormalization, ModelMode, Seed};

use crate::TrainBackend;

/// Configuration for [`LinearProbe`].
#[derive(Debug, Clone)]
pub struct LinearProbeConfig {
    /// Input channels.
    pub channels: usize,
    /// Input height and width.
    pub image_size: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Width of the hidden layer.
    pub hidden: usize,
    /// Dropout rate, active in training mode only.
    pub dropout: f64,
    /// Seed for the weights.
    pub seed: Seed,
}

impl LinearProbeConfig {
    /// Create a new config with a 64-unit hidden layer and 10% dropout.
    pub fn new(channels: usize, image_size: usize, n_classes: usize, seed: Seed) -> Self {
        Self {
            channels,
            image_size,
            n_classes,
            hidden: 64,
            dropout: 0.1,
            seed,
        }
    }

    /// Number of input features after flattening.
    pub fn features(&self) -> usize {
        self.channels * self.image_size * self.image_size
    }

    /// Initialize the model with weights drawn from the configured seed.
    pub fn init(&self, device: &<TrainBackend as Backend>::Device) -> LinearProbe {
        TrainBackend::seed(self.seed.derive("weights").value());
        let net = ProbeNet {
            hidden: LinearConfig::new(self.features(), self.hidden).init(device),
            head: LinearConfig::new(self.hidden, self.n_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        };
        LinearProbe {
            net,
            n_classes: self.n_classes,
            mode: ModelMode::Training,
        }
    }
}

#[derive(Module, Debug)]
struct ProbeNet<B: Backend> {
    hidden: Linear<B>,
    head: Linear<B>,
    dropout: Dropout,
}

/// Flatten, Linear + ReLU, Dropout, Linear.
///
/// The mode lives outside the module: burn's `Dropout` is active whenever the
/// backend tracks gradients, which is always the case here.
#[derive(Debug)]
pub struct LinearProbe {
    net: ProbeNet<TrainBackend>,
    n_classes: usize,
    mode: ModelMode,
}

impl ImageClassifier<TrainBackend> for LinearProbe {
    fn forward(&self, images: Tensor<TrainBackend, 4>) -> Tensor<TrainBackend, 2> {
        let [n, c, h, w] = images.dims();
        let x = self.net.hidden.forward(images.reshape([n, c * h * w]));
        let x = Relu::new().forward(x);
        let x = match self.mode {
            ModelMode::Training => self.net.dropout.forward(x),
            ModelMode::Inference => x,
        };
        self.net.head.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.n_classes
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }
}

/// Uniform `[0, 1]` pixels, normalized, of shape (N, C, S, S).
pub fn random_images<B: Backend>(
    batch: usize,
    config: &LinearProbeConfig,
    normalization: &ImageNormalization,
    seed: Seed,
    device: &B::Device,
) -> netviz_core::Result<Tensor<B, 4>> {
    let mut rng = seed.derive("images").to_rng();
    let shape = [batch, config.channels, config.image_size, config.image_size];
    let pixels: Vec<f32> = (0..shape.iter().product::<usize>()).map(|_| rng.gen()).collect();
    normalization.normalize(Tensor::from_data(TensorData::new(pixels, shape), device))
}

/// Smallest and largest element.
pub fn value_range<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> (f32, f32) {
    let min: f32 = tensor.clone().min().into_scalar().elem();
    let max: f32 = tensor.max().into_scalar().elem();
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netviz_core::InferenceMode;

    fn probe() -> LinearProbe {
        LinearProbeConfig::new(3, 4, 5, Seed::new(1)).init(&Default::default())
    }

    #[test]
    fn test_probe_config() {
        let config = LinearProbeConfig::new(3, 4, 5, Seed::new(1));
        assert_eq!(config.features(), 48);
        assert_eq!(config.hidden, 64);
        assert_eq!(config.seed, Seed::new(1));
    }

    #[test]
    fn test_probe_shapes() {
        let model = probe();
        let images = Tensor::<TrainBackend, 4>::zeros([2, 3, 4, 4], &Default::default());
        assert_eq!(model.forward(images).dims(), [2, 5]);
        assert_eq!(model.num_classes(), 5);
    }

    #[test]
    fn test_probe_inference_is_deterministic() {
        let mut model = probe();
        let device = Default::default();
        let config = LinearProbeConfig::new(3, 4, 5, Seed::new(1));
        let images = random_images::<TrainBackend>(2, &config, &ImageNormalization::imagenet(), Seed::new(2), &device)
            .unwrap();

        let guard = InferenceMode::<TrainBackend, _>::enter(&mut model);
        let a: Vec<f32> = guard.forward(images.clone()).into_data().iter::<f32>().collect();
        let b: Vec<f32> = guard.forward(images).into_data().iter::<f32>().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_images_in_pixel_range() {
        let config = LinearProbeConfig::new(3, 4, 5, Seed::new(1));
        let norm = ImageNormalization::imagenet();
        let images = random_images::<TrainBackend>(3, &config, &norm, Seed::new(9), &Default::default()).unwrap();
        assert_eq!(images.dims(), [3, 3, 4, 4]);

        let pixels = norm.denormalize(images).unwrap();
        let (min, max) = value_range(pixels);
        assert!(min >= -1e-5 && max <= 1.0 + 1e-5);
    }
}
