//! End-to-end training run
//!
//! Loads both splits, builds the model and optimizer from a `RunConfig`,
//! picks a fresh run directory, and trains with metrics written to
//! `metrics.jsonl` inside it.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use burn::module::Module;
use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use tracing::info;

use crate::dataset::cifar::{CifarDataset, CifarSplit};
use crate::dataset::loader::CifarLoader;
use crate::model::config::{RunConfig, CONFIG_FILE};
use crate::training::optimizer::MomentumSgd;
use crate::training::run_dir::{unique_run_dir, RunDirParams};
use crate::training::trainer::{Trainer, ValidationSummary};
use crate::utils::error::Result;
use crate::utils::format_duration;
use crate::utils::summary::JsonlSummaryWriter;

/// File name of the saved model inside a run directory (the recorder adds
/// the `.mpk.gz` extension)
pub const MODEL_FILE: &str = "model";

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub num_params: usize,
    pub steps: usize,
    pub last_validation: Option<ValidationSummary>,
    pub elapsed_secs: f64,
}

/// Train a fresh model as described by `config`
pub fn run_training<B: AutodiffBackend>(
    config: &RunConfig,
    device: B::Device,
    save_model: bool,
) -> Result<RunOutcome> {
    config.validate()?;
    let start = Instant::now();

    println!("{}", "Loading CIFAR-10...".cyan());
    let train = CifarDataset::load(&config.dataset_root, CifarSplit::Train)?;
    let test = CifarDataset::load(&config.dataset_root, CifarSplit::Test)?;

    let train_loader = CifarLoader::new(train, config.batch_size, config.worker_count)?
        .with_shuffle(config.seed)
        .with_augmentation(config.augmentation.clone());
    let val_loader = CifarLoader::new(test, config.batch_size, config.worker_count)?;
    info!("Train loader: {:?}", train_loader);
    info!("Validation loader: {:?}", val_loader);

    let model = config.model_config().init::<B>(&device);
    let num_params = model.num_params();
    info!("Model has {} parameters", num_params);

    let run_dir = unique_run_dir(&config.log_dir, &RunDirParams::from_config(config, num_params));
    fs::create_dir_all(&run_dir)?;
    config.save(&run_dir.join(CONFIG_FILE))?;
    println!("{} {}", "Writing logs to".cyan(), run_dir.display());

    let sink = JsonlSummaryWriter::new(&run_dir)?;
    let optimizer = MomentumSgd::new(config.learning_rate, config.momentum);
    let mut trainer = Trainer::new(model, optimizer, train_loader, val_loader, sink, device);

    trainer.train(
        config.epochs,
        config.val_frequency,
        config.print_frequency,
        config.log_frequency,
    )?;

    if save_model {
        trainer.save_model(&run_dir.join(MODEL_FILE))?;
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    info!("Run finished in {}", format_duration(elapsed_secs));

    let state = trainer.state();
    Ok(RunOutcome {
        run_dir,
        num_params,
        steps: state.step,
        last_validation: state.last_validation.clone(),
        elapsed_secs,
    })
}
