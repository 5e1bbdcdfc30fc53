//! Training loop for the CIFAR CNN
//!
//! The trainer owns the model, the optimizer, both batch sources and the
//! metrics sink. One global step counter runs across all epochs and keys
//! every logged observation.
//!
//! Per step:
//! - batch on device, forward, cross-entropy, backward, optimizer step
//! - batch accuracy from the argmax of the logits
//! - data-load and step latency
//! - metrics every `log_frequency` steps, a progress line every
//!   `print_frequency` steps
//!
//! After each epoch the epoch index is logged, and every `val_frequency`
//! epochs a validation pass runs on the inner (non-autodiff) backend.

use std::path::Path;
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::GradientsParams,
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use tracing::{debug, info};

use crate::dataset::cifar::{CifarBatch, CifarBatcher};
use crate::dataset::loader::BatchSource;
use crate::model::cnn::CifarCnn;
use crate::training::optimizer::MomentumSgd;
use crate::utils::error::{CifarError, Result};
use crate::utils::metrics::{
    compute_accuracy, compute_per_class_accuracy_with_count, format_per_class, mean_class_accuracy,
};
use crate::utils::summary::MetricsSink;

/// What the trainer is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainerMode {
    /// Before the first epoch and after the last
    #[default]
    Idle,
    Training,
    Validating,
}

/// Aggregated outcome of one validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
    /// Summed batch losses divided by the number of batches
    pub average_loss: f64,
    /// Accuracy per class; NaN for classes absent from the validation data
    pub per_class_accuracy: Vec<f64>,
    /// Unweighted mean of `per_class_accuracy`
    pub mean_class_accuracy: f64,
    /// Fraction of all validation items predicted correctly
    pub overall_accuracy: f64,
}

/// Raw predictions collected during a validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub predictions: Vec<usize>,
    pub labels: Vec<usize>,
    pub total_loss: f64,
    pub num_batches: usize,
}

impl ValidationResult {
    pub fn summarize(&self, class_count: usize) -> ValidationSummary {
        let per_class_accuracy =
            compute_per_class_accuracy_with_count(&self.labels, &self.predictions, class_count);
        ValidationSummary {
            average_loss: self.total_loss / self.num_batches as f64,
            mean_class_accuracy: mean_class_accuracy(&per_class_accuracy),
            overall_accuracy: compute_accuracy(&self.labels, &self.predictions),
            per_class_accuracy,
        }
    }
}

/// Training progress
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Optimizer steps taken so far; never reset between epochs
    pub step: usize,
    pub mode: TrainerMode,
    /// `(epoch, step)` logged at the end of each epoch
    pub epoch_marks: Vec<(usize, usize)>,
    /// Epochs after which validation ran
    pub validation_epochs: Vec<usize>,
    pub last_validation: Option<ValidationSummary>,
}

/// Losses, accuracy and timings of a single training step
#[derive(Debug, Clone, Copy)]
struct StepMetrics {
    loss: f64,
    accuracy: f64,
    data_load_time: f64,
    step_time: f64,
}

/// Supervised trainer for `CifarCnn`
pub struct Trainer<B, T, V, S>
where
    B: AutodiffBackend,
    T: BatchSource,
    V: BatchSource,
    S: MetricsSink,
{
    model: CifarCnn<B>,
    optimizer: MomentumSgd<B, CifarCnn<B>>,
    train_source: T,
    val_source: V,
    sink: S,
    batcher: CifarBatcher,
    device: B::Device,
    state: TrainingState,
}

impl<B, T, V, S> Trainer<B, T, V, S>
where
    B: AutodiffBackend,
    T: BatchSource,
    V: BatchSource,
    S: MetricsSink,
{
    /// Create a trainer; the model must already live on `device`
    pub fn new(
        model: CifarCnn<B>,
        optimizer: MomentumSgd<B, CifarCnn<B>>,
        train_source: T,
        val_source: V,
        sink: S,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optimizer,
            train_source,
            val_source,
            sink,
            batcher: CifarBatcher,
            device,
            state: TrainingState::default(),
        }
    }

    /// Run `epochs` passes over the training source
    ///
    /// Any error from a batch source or the sink aborts training and is
    /// returned as is.
    pub fn train(
        &mut self,
        epochs: usize,
        val_frequency: usize,
        print_frequency: usize,
        log_frequency: usize,
    ) -> Result<()> {
        for (name, value) in [
            ("val_frequency", val_frequency),
            ("print_frequency", print_frequency),
            ("log_frequency", log_frequency),
        ] {
            if value == 0 {
                return Err(CifarError::Config(format!("{} must be greater than 0", name)));
            }
        }

        let num_batches = self.train_source.num_batches();
        info!(
            "Training for {} epochs, {} batches per epoch, lr = {}",
            epochs,
            num_batches,
            self.optimizer.learning_rate()
        );

        for epoch in 0..epochs {
            self.state.epoch = epoch;
            self.state.mode = TrainerMode::Training;

            let mut data_load_start = Instant::now();
            for items in self.train_source.batches() {
                let items = items?;
                let batch: CifarBatch<B> = self.batcher.batch(items, &self.device);
                let data_load_end = Instant::now();

                let (model, loss, accuracy) =
                    Self::optimize(self.model.clone(), &mut self.optimizer, batch, &self.device);
                self.model = model;

                let metrics = StepMetrics {
                    loss,
                    accuracy,
                    data_load_time: (data_load_end - data_load_start).as_secs_f64(),
                    step_time: data_load_end.elapsed().as_secs_f64(),
                };
                let step = self.state.step;
                debug!("step {}: loss = {:.5}, accuracy = {:.4}", step, loss, accuracy);

                if (step + 1) % log_frequency == 0 {
                    log_metrics(&mut self.sink, epoch, step, &metrics)?;
                }
                if (step + 1) % print_frequency == 0 {
                    print_metrics(epoch, step, num_batches, &metrics);
                }

                self.state.step += 1;
                data_load_start = Instant::now();
            }

            self.sink.add_scalar("epoch", epoch as f64, self.state.step)?;
            self.state.epoch_marks.push((epoch, self.state.step));

            if (epoch + 1) % val_frequency == 0 {
                self.validate()?;
                self.state.mode = TrainerMode::Training;
            }
        }

        self.sink.flush()?;
        self.state.mode = TrainerMode::Idle;
        info!("Training finished after {} steps", self.state.step);
        Ok(())
    }

    /// One forward/backward/update cycle; returns the new model, the batch
    /// loss and the batch accuracy
    fn optimize(
        model: CifarCnn<B>,
        optimizer: &mut MomentumSgd<B, CifarCnn<B>>,
        batch: CifarBatch<B>,
        device: &B::Device,
    ) -> (CifarCnn<B>, f64, f64) {
        let logits = model.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(logits.clone(), batch.targets.clone());

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optimizer.step(model, grads);

        let loss_value: f64 = loss.into_scalar().elem();
        let accuracy = batch_accuracy(logits.detach(), batch.targets);
        (model, loss_value, accuracy)
    }

    /// Evaluate on the validation source and log `accuracy/test` and `loss/test`
    ///
    /// Leaves the trainer in `Validating` mode; step and epoch are unchanged.
    pub fn validate(&mut self) -> Result<ValidationSummary> {
        self.state.mode = TrainerMode::Validating;
        let model = self.model.valid();
        let criterion = CrossEntropyLossConfig::new().init(&self.device);

        let mut result = ValidationResult::default();
        for items in self.val_source.batches() {
            let items = items?;
            let batch: CifarBatch<B::InnerBackend> = self.batcher.batch(items, &self.device);

            let logits = model.forward(batch.images);
            let loss = criterion.forward(logits.clone(), batch.targets.clone());
            result.total_loss += loss.into_scalar().elem::<f64>();
            result.num_batches += 1;

            result.predictions.extend(argmax_labels(logits)?);
            result.labels.extend(to_labels(batch.targets)?);
        }

        let summary = result.summarize(self.model.class_count());
        self.sink
            .add_scalars("accuracy", &[("test", summary.mean_class_accuracy)], self.state.step)?;
        self.sink
            .add_scalars("loss", &[("test", summary.average_loss)], self.state.step)?;

        info!(
            "validation loss: {:.5}, accuracy: [{}]",
            summary.average_loss,
            format_per_class(&summary.per_class_accuracy)
        );

        self.state.validation_epochs.push(self.state.epoch);
        self.state.last_validation = Some(summary.clone());
        Ok(summary)
    }

    /// Save the model with Burn's compact recorder
    pub fn save_model(&self, path: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        self.model
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| CifarError::Model(format!("failed to save model: {:?}", e)))?;

        info!("Model saved to {:?} (step {})", path, self.state.step);
        Ok(())
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn model(&self) -> &CifarCnn<B> {
        &self.model
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Take back the trained model and the sink
    pub fn into_parts(self) -> (CifarCnn<B>, S) {
        (self.model, self.sink)
    }
}

fn log_metrics<S: MetricsSink>(
    sink: &mut S,
    epoch: usize,
    step: usize,
    metrics: &StepMetrics,
) -> Result<()> {
    sink.add_scalar("epoch", epoch as f64, step)?;
    sink.add_scalars("accuracy", &[("train", metrics.accuracy)], step)?;
    sink.add_scalars("loss", &[("train", metrics.loss)], step)?;
    sink.add_scalar("time/data", metrics.data_load_time, step)?;
    sink.add_scalar("time/step", metrics.step_time, step)?;
    Ok(())
}

fn print_metrics(epoch: usize, step: usize, num_batches: usize, metrics: &StepMetrics) {
    info!(
        "epoch: [{}], step: [{}/{}], batch loss: {:.5}, batch accuracy: {:2.2}, data load time: {:.5}, step time: {:.5}",
        epoch,
        step % num_batches.max(1),
        num_batches,
        metrics.loss,
        metrics.accuracy * 100.0,
        metrics.data_load_time,
        metrics.step_time
    );
}

/// Fraction of rows whose highest logit matches the target
fn batch_accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [n, _] = logits.dims();
    let correct: i64 = logits
        .argmax(1)
        .reshape([n])
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as f64 / n as f64
}

fn argmax_labels<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<usize>> {
    let [n, _] = logits.dims();
    to_labels(logits.argmax(1).reshape([n]))
}

fn to_labels<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| CifarError::Training(format!("failed to read labels: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v as usize).collect())
}
