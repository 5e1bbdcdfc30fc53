//! End-to-end run on a tiny on-disk dataset
//!
//! Run with: cargo test --test run_training

use std::fs;
use std::path::Path;

use cifar_cnn::backend::CpuTrainingBackend;
use cifar_cnn::dataset::augmentation::AugmentationConfig;
use cifar_cnn::dataset::cifar::{batches_dir, CifarSplit, CHANNEL_LEN};
use cifar_cnn::model::config::{RunConfig, CONFIG_FILE};
use cifar_cnn::training::run_training;
use cifar_cnn::JsonlSummaryWriter;

/// Write `records` images per batch file, labels cycling through 0..10
fn write_dataset(root: &Path, records: usize) {
    let dir = batches_dir(root);
    fs::create_dir_all(&dir).unwrap();

    let names = CifarSplit::Train
        .file_names()
        .into_iter()
        .chain(CifarSplit::Test.file_names());
    for (file_index, name) in names.enumerate() {
        let mut bytes = Vec::new();
        for r in 0..records {
            bytes.push(((file_index + r) % 10) as u8);
            for channel in 0..3u8 {
                bytes.extend(std::iter::repeat(channel * 60 + r as u8).take(CHANNEL_LEN));
            }
        }
        fs::write(dir.join(name), bytes).unwrap();
    }
}

fn config(root: &Path) -> RunConfig {
    RunConfig {
        dataset_root: root.join("data"),
        log_dir: root.join("logs"),
        batch_size: 4,
        epochs: 2,
        val_frequency: 1,
        log_frequency: 1,
        print_frequency: 2,
        worker_count: 2,
        augmentation: AugmentationConfig {
            horizontal_flip: true,
            brightness: 0.2,
            reflection: 2,
        },
        ..Default::default()
    }
}

#[test]
fn test_run_writes_config_metrics_and_model() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    write_dataset(&config.dataset_root, 2);

    let outcome = run_training::<CpuTrainingBackend>(&config, Default::default(), true).unwrap();

    // 5 training files x 2 records = 10 images, 3 batches of at most 4
    assert_eq!(outcome.steps, 6);
    assert!(outcome.num_params > 0);

    let name = outcome.run_dir.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with(&format!("CNN_parameters={}_bn_bs=4_", outcome.num_params)));
    assert!(name.contains("_brightness=0.2_hflip_reflect=2_run_"));
    assert!(name.ends_with("_run_0"));

    let saved = RunConfig::load(&outcome.run_dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(saved, config);

    let events = JsonlSummaryWriter::read_events(&outcome.run_dir).unwrap();
    let test_losses: Vec<_> = events.iter().filter(|e| e.tag == "loss/test").collect();
    assert_eq!(test_losses.len(), 2);
    assert_eq!(events.iter().filter(|e| e.tag == "loss/train").count(), 6);

    assert!(outcome.run_dir.join("model.mpk.gz").exists());

    let summary = outcome.last_validation.unwrap();
    assert_eq!(summary.per_class_accuracy.len(), 10);
}

#[test]
fn test_second_run_gets_next_suffix() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RunConfig {
        epochs: 1,
        ..config(tmp.path())
    };
    write_dataset(&config.dataset_root, 1);

    let first = run_training::<CpuTrainingBackend>(&config, Default::default(), false).unwrap();
    let second = run_training::<CpuTrainingBackend>(&config, Default::default(), false).unwrap();

    assert!(first.run_dir.to_string_lossy().ends_with("_run_0"));
    assert!(second.run_dir.to_string_lossy().ends_with("_run_1"));
    assert!(!first.run_dir.join("model.mpk.gz").exists());
}

#[test]
fn test_missing_dataset_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());

    let result = run_training::<CpuTrainingBackend>(&config, Default::default(), false);
    assert!(matches!(result, Err(cifar_cnn::CifarError::PathNotFound(_))));
}

#[test]
fn test_class_count_mismatch_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RunConfig {
        class_count: 5,
        ..config(tmp.path())
    };
    write_dataset(&config.dataset_root, 1);

    let result = run_training::<CpuTrainingBackend>(&config, Default::default(), false);
    assert!(matches!(result, Err(cifar_cnn::CifarError::Config(_))));
    assert!(!config.log_dir.exists());
}

#[test]
fn test_absent_validation_classes_survive_in_metrics_log() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RunConfig {
        epochs: 1,
        ..config(tmp.path())
    };
    // Test split labels are 5 and 6 only
    write_dataset(&config.dataset_root, 2);

    let outcome = run_training::<CpuTrainingBackend>(&config, Default::default(), false).unwrap();
    let summary = outcome.last_validation.unwrap();
    assert!(summary.per_class_accuracy[0].is_nan());
    assert!(summary.mean_class_accuracy.is_nan());

    let events = JsonlSummaryWriter::read_events(&outcome.run_dir).unwrap();
    let accuracy: Vec<_> = events.iter().filter(|e| e.tag == "accuracy/test").collect();
    assert_eq!(accuracy.len(), 1);
    assert!(accuracy[0].value.is_nan());
}
