//! CIFAR-10 CNN CLI
//!
//! Entry point for training the CIFAR-10 classifier, fetching the dataset and
//! inspecting it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use cifar_cnn::backend::{backend_name, resolve_device, CpuTrainingBackend, DeviceKind};
use cifar_cnn::dataset::augmentation::AugmentationConfig;
use cifar_cnn::dataset::cifar::{CifarDataset, CifarSplit, CLASS_NAMES};
use cifar_cnn::dataset::download::{download_cifar10, is_extracted};
use cifar_cnn::model::config::RunConfig;
use cifar_cnn::training::{run_training, RunOutcome};
use cifar_cnn::utils::format_duration;
use cifar_cnn::utils::logging::{init_logging, LogConfig};
use cifar_cnn::utils::metrics::format_per_class;

/// Train a CNN on CIFAR-10
#[derive(Parser, Debug)]
#[command(name = "cifar_cnn")]
#[command(version = "0.1.0")]
#[command(about = "Train a CIFAR-10 CNN with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the CNN
    Train(TrainArgs),

    /// Download and extract CIFAR-10
    Download {
        /// Directory receiving the dataset
        #[arg(long, default_value = "data/cifar10")]
        dataset_root: PathBuf,
    },

    /// Show the class distribution of both splits
    Stats {
        /// Directory holding the dataset
        #[arg(long, default_value = "data/cifar10")]
        dataset_root: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Directory holding (or receiving) the dataset
    #[arg(long, default_value = "data/cifar10")]
    dataset_root: PathBuf,

    /// Parent directory for run directories
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Learning rate
    #[arg(long, default_value = "0.01")]
    learning_rate: f64,

    /// Number of images within each mini-batch
    #[arg(long, default_value = "128")]
    batch_size: usize,

    /// Number of passes over the training data
    #[arg(long, default_value = "20")]
    epochs: usize,

    /// How frequently (in epochs) to test the model on the validation set
    #[arg(long, default_value = "2")]
    val_frequency: usize,

    /// How frequently (in steps) to save logs
    #[arg(long, default_value = "10")]
    log_frequency: usize,

    /// How frequently (in steps) to print progress
    #[arg(long, default_value = "10")]
    print_frequency: usize,

    /// Number of worker threads preparing batches (defaults to available parallelism)
    #[arg(short = 'j', long)]
    worker_count: Option<usize>,

    /// Randomly flip training images horizontally
    #[arg(long, default_value = "false")]
    data_aug_hflip: bool,

    /// Brightness jitter magnitude
    #[arg(long, default_value = "0")]
    data_aug_brightness: f32,

    /// Reflection padding before a random crop (pixels)
    #[arg(long, default_value = "0")]
    data_aug_reflection: u32,

    /// Dropout rate
    #[arg(long, default_value = "0")]
    dropout: f64,

    /// Seed for shuffling and augmentation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Compute device
    #[arg(long, value_enum, default_value = "cpu")]
    device: DeviceKind,

    /// Load hyperparameters from a saved config.json instead of the flags above
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the trained model into the run directory
    #[arg(long, default_value = "false")]
    save_model: bool,

    /// Fail instead of downloading a missing dataset
    #[arg(long, default_value = "false")]
    no_download: bool,
}

impl TrainArgs {
    fn run_config(&self) -> Result<RunConfig> {
        if let Some(path) = &self.config {
            info!("Loading configuration from {:?}", path);
            return Ok(RunConfig::load(path)?);
        }

        let defaults = RunConfig::default();
        Ok(RunConfig {
            dataset_root: self.dataset_root.clone(),
            log_dir: self.log_dir.clone(),
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            epochs: self.epochs,
            val_frequency: self.val_frequency,
            log_frequency: self.log_frequency,
            print_frequency: self.print_frequency,
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            dropout: self.dropout,
            augmentation: AugmentationConfig {
                horizontal_flip: self.data_aug_hflip,
                brightness: self.data_aug_brightness,
                reflection: self.data_aug_reflection,
            },
            seed: self.seed,
            ..defaults
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet, cli.log_level.as_deref());

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => cmd_train(&args)?,
        Commands::Download { dataset_root } => {
            let dir = download_cifar10(&dataset_root)?;
            println!("{} {}", "Dataset ready in".green(), dir.display());
        }
        Commands::Stats { dataset_root } => cmd_stats(&dataset_root)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------+
 |   CIFAR-10 CNN                             |
 |   Image classification with Burn + Rust    |
 +--------------------------------------------+
  "#
        .green()
    );
}

fn cmd_train(args: &TrainArgs) -> Result<()> {
    let config = args.run_config()?;
    config.validate()?;

    if !is_extracted(&config.dataset_root) {
        if args.no_download {
            anyhow::bail!(
                "CIFAR-10 not found in {:?} and --no-download was given",
                config.dataset_root
            );
        }
        download_cifar10(&config.dataset_root)?;
    }

    let (device, downgraded) = resolve_device(args.device);
    if downgraded {
        warn!("No accelerator backend compiled in (enable the `wgpu` or `cuda` feature); using CPU");
    }
    println!("{} {}", "Backend:".cyan(), backend_name(device));

    let outcome = match device {
        DeviceKind::Cpu => run_training::<CpuTrainingBackend>(&config, Default::default(), args.save_model)?,
        DeviceKind::Accelerator => run_accelerated(&config, args.save_model)?,
    };

    print_summary(&outcome);
    Ok(())
}

#[cfg(any(feature = "cuda", feature = "wgpu"))]
fn run_accelerated(config: &RunConfig, save_model: bool) -> cifar_cnn::Result<RunOutcome> {
    use cifar_cnn::backend::AcceleratorTrainingBackend;
    run_training::<AcceleratorTrainingBackend>(config, Default::default(), save_model)
}

#[cfg(not(any(feature = "cuda", feature = "wgpu")))]
fn run_accelerated(config: &RunConfig, save_model: bool) -> cifar_cnn::Result<RunOutcome> {
    run_training::<CpuTrainingBackend>(config, Default::default(), save_model)
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Run directory: {}", outcome.run_dir.display());
    println!("  Parameters:    {}", outcome.num_params);
    println!("  Steps:         {}", outcome.steps);
    println!("  Duration:      {}", format_duration(outcome.elapsed_secs));

    match &outcome.last_validation {
        Some(summary) => {
            println!("  Validation loss:     {:.5}", summary.average_loss);
            println!("  Mean class accuracy: {:.2}%", summary.mean_class_accuracy * 100.0);
            println!("  Per class:           [{}]", format_per_class(&summary.per_class_accuracy));
        }
        None => println!("  {}", "No validation pass ran".yellow()),
    }
}

fn cmd_stats(dataset_root: &Path) -> Result<()> {
    for split in [CifarSplit::Train, CifarSplit::Test] {
        let dataset = CifarDataset::load(dataset_root, split)?;
        let counts = dataset.class_distribution();
        let total: usize = counts.iter().sum();

        println!("{} ({} images)", split.to_string().cyan().bold(), total);
        for (name, count) in CLASS_NAMES.iter().zip(counts.iter()) {
            println!("  {:<12} {:>6}", name, count);
        }
    }
    Ok(())
}
