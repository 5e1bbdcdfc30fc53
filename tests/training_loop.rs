//! Trainer schedule tests on synthetic batches
//!
//! Run with: cargo test --test training_loop

use burn::backend::{Autodiff, NdArray};

use cifar_cnn::dataset::cifar::PIXELS_LEN;
use cifar_cnn::training::{MomentumSgd, Trainer, TrainerMode};
use cifar_cnn::utils::summary::ScalarEvent;
use cifar_cnn::{BatchSource, CifarCnn, CifarCnnConfig, CifarError, CifarItem, MemorySink, MetricsSink, Result};

type TestBackend = Autodiff<NdArray>;

/// Fixed number of small batches with deterministic contents
struct SyntheticSource {
    batches: usize,
    batch_size: usize,
    labels: usize,
    fail_at: Option<usize>,
}

impl SyntheticSource {
    fn new(batches: usize, batch_size: usize) -> Self {
        Self {
            batches,
            batch_size,
            labels: 10,
            fail_at: None,
        }
    }
}

impl BatchSource for SyntheticSource {
    fn num_batches(&self) -> usize {
        self.batches
    }

    fn num_items(&self) -> usize {
        self.batches * self.batch_size
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Vec<CifarItem>>> + '_> {
        let (batch_size, labels, fail_at) = (self.batch_size, self.labels, self.fail_at);
        Box::new((0..self.batches).map(move |b| {
            if Some(b) == fail_at {
                return Err(CifarError::Dataset(format!("batch {} unreadable", b)));
            }
            Ok((0..batch_size)
                .map(|i| CifarItem {
                    image: vec![((b + i) % 7) as f32 / 7.0; PIXELS_LEN],
                    label: (b * batch_size + i) % labels,
                })
                .collect())
        }))
    }
}

/// Sink that refuses every write
struct FailingSink;

impl MetricsSink for FailingSink {
    fn add_scalar(&mut self, tag: &str, _value: f64, _step: usize) -> Result<()> {
        Err(CifarError::Metrics(format!("cannot record {}", tag)))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn model() -> CifarCnn<TestBackend> {
    CifarCnnConfig::new().init(&Default::default())
}

fn trainer<S: MetricsSink>(
    train: SyntheticSource,
    val: SyntheticSource,
    sink: S,
) -> Trainer<TestBackend, SyntheticSource, SyntheticSource, S> {
    Trainer::new(
        model(),
        MomentumSgd::new(0.01, 0.9),
        train,
        val,
        sink,
        Default::default(),
    )
}

fn steps(events: &[&ScalarEvent]) -> Vec<usize> {
    events.iter().map(|e| e.step).collect()
}

#[test]
fn test_validation_runs_every_val_frequency_epochs() {
    let mut trainer = trainer(SyntheticSource::new(3, 2), SyntheticSource::new(1, 4), MemorySink::new());
    trainer.train(5, 2, 100, 100).unwrap();

    let state = trainer.state();
    assert_eq!(state.step, 15);
    assert_eq!(state.validation_epochs, vec![1, 3]);
    assert_eq!(state.mode, TrainerMode::Idle);
    assert_eq!(
        state.epoch_marks,
        vec![(0, 3), (1, 6), (2, 9), (3, 12), (4, 15)]
    );

    let sink = trainer.sink();
    assert_eq!(steps(&sink.series("loss/test")), vec![6, 12]);
    assert_eq!(steps(&sink.series("accuracy/test")), vec![6, 12]);
    assert!(sink.flushes >= 1);
}

#[test]
fn test_step_counter_equals_total_batches() {
    let mut trainer = trainer(SyntheticSource::new(4, 2), SyntheticSource::new(1, 2), MemorySink::new());
    trainer.train(2, 5, 100, 100).unwrap();

    assert_eq!(trainer.state().step, 8);
    assert!(trainer.state().validation_epochs.is_empty());
    assert!(trainer.state().last_validation.is_none());
}

#[test]
fn test_training_metrics_follow_log_frequency() {
    let mut trainer = trainer(SyntheticSource::new(7, 2), SyntheticSource::new(1, 2), MemorySink::new());
    trainer.train(1, 1, 3, 2).unwrap();

    let sink = trainer.sink();
    assert_eq!(steps(&sink.series("loss/train")), vec![1, 3, 5]);
    assert_eq!(steps(&sink.series("accuracy/train")), vec![1, 3, 5]);
    assert_eq!(steps(&sink.series("time/data")), vec![1, 3, 5]);
    assert_eq!(steps(&sink.series("time/step")), vec![1, 3, 5]);
    // Three per-step observations plus the end-of-epoch mark
    assert_eq!(steps(&sink.series("epoch")), vec![1, 3, 5, 7]);

    for event in sink.series("accuracy/train") {
        assert!((0.0..=1.0).contains(&event.value));
    }
    for event in sink.series("loss/train") {
        assert!(event.value.is_finite());
    }
}

#[test]
fn test_validation_reports_every_class() {
    let mut val = SyntheticSource::new(2, 3);
    val.labels = 4;
    let mut trainer = trainer(SyntheticSource::new(1, 2), val, MemorySink::new());

    let summary = trainer.validate().unwrap();
    assert_eq!(trainer.state().mode, TrainerMode::Validating);
    assert_eq!(trainer.state().step, 0);

    assert_eq!(summary.per_class_accuracy.len(), 10);
    assert!(summary.per_class_accuracy[..4].iter().all(|a| (0.0..=1.0).contains(a)));
    assert!(summary.per_class_accuracy[4..].iter().all(|a| a.is_nan()));
    assert!(summary.average_loss.is_finite());
    assert!((0.0..=1.0).contains(&summary.overall_accuracy));
}

#[test]
fn test_data_source_error_aborts_training() {
    let mut train = SyntheticSource::new(4, 2);
    train.fail_at = Some(2);
    let mut trainer = trainer(train, SyntheticSource::new(1, 2), MemorySink::new());

    let result = trainer.train(3, 1, 100, 1);
    assert!(matches!(result, Err(CifarError::Dataset(_))));
    assert_eq!(trainer.state().step, 2);
    assert!(trainer.state().validation_epochs.is_empty());
}

#[test]
fn test_sink_error_aborts_training() {
    let mut trainer = trainer(SyntheticSource::new(2, 2), SyntheticSource::new(1, 2), FailingSink);

    let result = trainer.train(1, 1, 100, 1);
    assert!(matches!(result, Err(CifarError::Metrics(_))));
    assert_eq!(trainer.state().step, 0);
}

#[test]
fn test_zero_frequency_rejected_before_training() {
    let mut trainer = trainer(SyntheticSource::new(2, 2), SyntheticSource::new(1, 2), MemorySink::new());

    assert!(matches!(trainer.train(1, 0, 1, 1), Err(CifarError::Config(_))));
    assert!(matches!(trainer.train(1, 1, 0, 1), Err(CifarError::Config(_))));
    assert!(matches!(trainer.train(1, 1, 1, 0), Err(CifarError::Config(_))));

    let (_, sink) = trainer.into_parts();
    assert!(sink.events.is_empty());
}

#[test]
fn test_zero_epochs_is_noop() {
    let mut trainer = trainer(SyntheticSource::new(2, 2), SyntheticSource::new(1, 2), MemorySink::new());
    trainer.train(0, 1, 1, 1).unwrap();

    assert_eq!(trainer.state().step, 0);
    assert!(trainer.sink().events.is_empty());
}
