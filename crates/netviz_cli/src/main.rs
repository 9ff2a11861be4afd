//! netviz CLI: saliency maps, fooling images and class visualization on a
//! seeded toy classifier.

mod demo;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use netviz_core::{ImageClassifier, ImageNormalization, InferenceMode, Seed};
use netviz_explain::{
    compute_saliency_maps, make_fooling_image, ClassVisualizationConfig, ClassVisualizer,
    FoolingConfig,
};

use demo::{random_images, value_range, LinearProbe, LinearProbeConfig};

/// Backend type for every demo: gradients w.r.t. the input need autodiff.
type TrainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "netviz")]
#[command(author, version)]
#[command(about = "Saliency maps, fooling images and class visualization for image classifiers")]
#[command(long_about = "netviz: look inside an image classifier through its input gradients.

Every subcommand builds a small seeded classifier (Flatten, Linear, ReLU,
Dropout, Linear) over ImageNet-normalized RGB images and runs one routine on it.

EXAMPLES:
  # Saliency maps for four random images, labelled with the model's predictions
  netviz saliency --batch 4

  # Push a random image to class 3
  netviz fool --target 3 --max-iters 500

  # Synthesize an image for class 7 from a JSON config
  netviz visualize --target 7 --config viz.json --json")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args)]
struct ProbeArgs {
    /// Height and width of the input images
    #[arg(long, default_value = "16", value_name = "PIXELS")]
    image_size: usize,

    /// Number of classes the probe scores
    #[arg(long, default_value = "10", value_name = "N")]
    classes: usize,

    /// Random seed for the weights and the inputs
    #[arg(long, default_value = "42", value_name = "SEED")]
    seed: u64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute saliency maps for a batch of random images
    Saliency {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Number of images
        #[arg(long, default_value = "2", value_name = "N")]
        batch: usize,
    },
    /// Perturb a random image until it is classified as the target
    Fool {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Class to fool the probe into predicting
        #[arg(long, value_name = "CLASS")]
        target: usize,

        /// Length of every update step
        #[arg(long, default_value = "1.0", value_name = "LR")]
        lr: f32,

        /// Give up after this many updates
        #[arg(long, default_value = "1000", value_name = "N")]
        max_iters: usize,
    },
    /// Synthesize an image that maximizes a class score
    Visualize {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Class to visualize
        #[arg(long, value_name = "CLASS")]
        target: usize,

        /// JSON file with a class visualization config
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the number of ascent steps
        #[arg(long, value_name = "N")]
        iterations: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Saliency { probe, batch } => handle_saliency(&probe, batch),
        Commands::Fool {
            probe,
            target,
            lr,
            max_iters,
        } => handle_fool(&probe, target, lr, max_iters),
        Commands::Visualize {
            probe,
            target,
            config,
            iterations,
        } => handle_visualize(&probe, target, config, iterations),
    }
}

fn build_probe(args: &ProbeArgs, device: &<TrainBackend as Backend>::Device) -> Result<(LinearProbeConfig, LinearProbe)> {
    if args.image_size == 0 || args.classes == 0 {
        bail!("--image-size and --classes must be positive");
    }
    let config = LinearProbeConfig::new(3, args.image_size, args.classes, Seed::new(args.seed));
    let model = config.init(device);
    tracing::info!(
        "Built probe: {} features -> {} hidden -> {} classes (seed {})",
        config.features(),
        config.hidden,
        config.n_classes,
        args.seed
    );
    Ok((config, model))
}

fn print_summary<T: Serialize + std::fmt::Display>(summary: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct SaliencySummary {
    shape: [usize; 3],
    labels: Vec<usize>,
    max_saliency: Vec<f32>,
}

impl std::fmt::Display for SaliencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Saliency maps {:?}", self.shape)?;
        for (i, (label, max)) in self.labels.iter().zip(&self.max_saliency).enumerate() {
            writeln!(f, "  image {:>3}: label {:>4}, max saliency {:.6}", i, label, max)?;
        }
        Ok(())
    }
}

fn handle_saliency(args: &ProbeArgs, batch: usize) -> Result<()> {
    if batch == 0 {
        bail!("--batch must be positive");
    }
    let device = Default::default();
    let (config, mut model) = build_probe(args, &device)?;
    let normalization = ImageNormalization::imagenet();
    let images = random_images::<NdArray>(batch, &config, &normalization, Seed::new(args.seed), &device)?;

    // Without ground truth, explain the probe's own predictions.
    let labels = {
        let guard = InferenceMode::<TrainBackend, _>::enter(&mut model);
        guard.predict(Tensor::from_inner(images.clone()))
    };
    let saliency = compute_saliency_maps::<TrainBackend, _>(images, &labels, &mut model)
        .context("Failed to compute saliency maps")?;

    print_summary(
        &SaliencySummary {
            shape: saliency.shape(),
            max_saliency: saliency.max_per_image(),
            labels,
        },
        args.json,
    )
}

#[derive(Serialize)]
struct FoolSummary {
    original_class: usize,
    target: usize,
    iterations: usize,
    target_score: f32,
    l2_distance: f32,
    max_abs_change: f32,
}

impl std::fmt::Display for FoolSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Fooled class {} into {} after {} iteration(s)", self.original_class, self.target, self.iterations)?;
        writeln!(f, "  target score:   {:.4}", self.target_score)?;
        writeln!(f, "  L2 distance:    {:.4}", self.l2_distance)?;
        write!(f, "  max |change|:   {:.4}", self.max_abs_change)
    }
}

fn handle_fool(args: &ProbeArgs, target: usize, lr: f32, max_iters: usize) -> Result<()> {
    let device = Default::default();
    let (config, mut model) = build_probe(args, &device)?;
    if target >= model.num_classes() {
        bail!(
            "Target class {} is out of range: the probe scores {} classes",
            target,
            model.num_classes()
        );
    }
    let image = random_images::<NdArray>(1, &config, &ImageNormalization::imagenet(), Seed::new(args.seed), &device)?;

    let original_class = {
        let guard = InferenceMode::<TrainBackend, _>::enter(&mut model);
        guard.predict(Tensor::from_inner(image.clone()))[0]
    };
    let fooling_config = FoolingConfig::default()
        .with_learning_rate(lr)
        .with_max_iters(max_iters);
    let fooled = make_fooling_image::<TrainBackend, _>(image.clone(), target, &mut model, &fooling_config)
        .context(format!("Failed to fool the probe into class {}", target))?;

    let (low, high) = value_range(fooled.perturbation(image.clone(), 1.0));
    print_summary(
        &FoolSummary {
            original_class,
            target,
            iterations: fooled.iterations,
            target_score: fooled.final_step.target_score,
            l2_distance: fooled.distance_from(image),
            max_abs_change: low.abs().max(high.abs()),
        },
        args.json,
    )
}

#[derive(Serialize)]
struct VisualizeSummary {
    target: usize,
    iterations: usize,
    final_score: f32,
    pixel_range: (f32, f32),
    config: ClassVisualizationConfig,
}

impl std::fmt::Display for VisualizeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Visualized class {} in {} iteration(s)", self.target, self.iterations)?;
        writeln!(f, "  final score:  {:.4}", self.final_score)?;
        write!(f, "  pixel range:  [{:.4}, {:.4}]", self.pixel_range.0, self.pixel_range.1)
    }
}

fn load_viz_config(path: Option<PathBuf>, seed: u64) -> Result<ClassVisualizationConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .context(format!("Failed to read config '{}'", path.display()))?;
            serde_json::from_str(&text).context(format!("Invalid config '{}'", path.display()))
        }
        None => Ok(ClassVisualizationConfig::default().with_seed(seed)),
    }
}

fn handle_visualize(
    args: &ProbeArgs,
    target: usize,
    config_path: Option<PathBuf>,
    iterations: Option<usize>,
) -> Result<()> {
    let device = Default::default();
    let (probe_config, mut model) = build_probe(args, &device)?;

    let mut config = load_viz_config(config_path, args.seed)?;
    if let Some(iterations) = iterations {
        config = config.with_num_iterations(iterations);
    }
    let normalization = config.normalization.clone();
    let visualizer = ClassVisualizer::new(config).context("Invalid class visualization config")?;

    let viz = visualizer
        .visualize::<TrainBackend, _>(&mut model, target, probe_config.image_size, probe_config.image_size, &device)
        .context(format!("Failed to visualize class {}", target))?;

    let pixels = normalization.denormalize(viz.image)?;
    print_summary(
        &VisualizeSummary {
            target: viz.target,
            iterations: viz.iterations,
            final_score: viz.final_score,
            pixel_range: value_range(pixels),
            config: visualizer.config().clone(),
        },
        args.json,
    )
}
