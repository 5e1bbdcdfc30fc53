//! Metrics sink for scalar training curves.
//!
//! Observations are keyed by the trainer's global step. `add_scalars` groups
//! several named values under one main tag and records each one as
//! `"{main_tag}/{name}"`, so `("accuracy", [("train", 0.4)])` becomes the
//! series `accuracy/train`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{CifarError, Result};

/// File name of the event log inside a run directory
pub const EVENTS_FILE: &str = "metrics.jsonl";

/// A single logged observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    /// Non-finite values are written as `"NaN"`, `"inf"` or `"-inf"`
    #[serde(with = "non_finite")]
    pub value: f64,
    pub step: usize,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
}

/// JSON has no NaN or infinity, so those travel as strings.
///
/// A `null` left by an older writer reads back as NaN.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
        Null(()),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Null(()) => Ok(f64::NAN),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number, \"NaN\", \"inf\" or \"-inf\", got {:?}",
                    other
                ))),
            },
        }
    }
}

/// Destination for named scalar observations.
pub trait MetricsSink {
    /// Record one value under `tag` at `step`.
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

    /// Record a group of values under `main_tag` at `step`.
    fn add_scalars(&mut self, main_tag: &str, values: &[(&str, f64)], step: usize) -> Result<()> {
        for (name, value) in values {
            self.add_scalar(&format!("{}/{}", main_tag, name), *value, step)?;
        }
        Ok(())
    }

    /// Push buffered observations to their destination.
    fn flush(&mut self) -> Result<()>;
}

fn wall_time() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Appends events as JSON lines to `<log_dir>/metrics.jsonl`.
///
/// Writes are buffered and flushed at most every `flush_interval`, and on
/// drop.
pub struct JsonlSummaryWriter {
    log_dir: PathBuf,
    writer: BufWriter<File>,
    flush_interval: Duration,
    last_flush: Instant,
}

impl JsonlSummaryWriter {
    /// Create the log directory if needed and open the event file for append.
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_flush_secs(log_dir, 5)
    }

    pub fn with_flush_secs(log_dir: impl AsRef<Path>, flush_secs: u64) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(EVENTS_FILE))?;

        Ok(Self {
            log_dir,
            writer: BufWriter::new(file),
            flush_interval: Duration::from_secs(flush_secs),
            last_flush: Instant::now(),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Read every event back from a run directory.
    pub fn read_events(log_dir: impl AsRef<Path>) -> Result<Vec<ScalarEvent>> {
        let content = fs::read_to_string(log_dir.as_ref().join(EVENTS_FILE))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CifarError::from))
            .collect()
    }
}

impl MetricsSink for JsonlSummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
            wall_time: wall_time(),
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| CifarError::Metrics(format!("failed to write event: {}", e)))?;

        if self.last_flush.elapsed() >= self.flush_interval {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| CifarError::Metrics(format!("failed to flush {:?}: {}", self.log_dir, e)))?;
        self.last_flush = Instant::now();
        debug!("Flushed metrics to {:?}", self.log_dir);
        Ok(())
    }
}

impl Drop for JsonlSummaryWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Keeps every observation in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<ScalarEvent>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded under `tag`, in logging order.
    pub fn series(&self, tag: &str) -> Vec<&ScalarEvent> {
        self.events.iter().filter(|e| e.tag == tag).collect()
    }
}

impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.events.push(ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
            wall_time: wall_time(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_groups_scalars() {
        let mut sink = MemorySink::new();
        sink.add_scalars("accuracy", &[("train", 0.25), ("test", 0.5)], 7)
            .unwrap();
        sink.add_scalar("epoch", 0.0, 7).unwrap();

        assert_eq!(sink.events.len(), 3);
        assert_eq!(sink.series("accuracy/train")[0].value, 0.25);
        assert_eq!(sink.series("accuracy/test")[0].step, 7);
        assert_eq!(sink.series("epoch").len(), 1);
    }

    #[test]
    fn test_jsonl_writer_round_trips_events() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("run");
        {
            let mut writer = JsonlSummaryWriter::new(&run_dir).unwrap();
            writer.add_scalar("loss/train", 2.3, 10).unwrap();
            writer.add_scalars("loss", &[("test", 1.9)], 20).unwrap();
        }

        let events = JsonlSummaryWriter::read_events(&run_dir).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tag, "loss/train");
        assert_eq!(events[0].step, 10);
        assert_eq!(events[1].tag, "loss/test");
        assert!((events[1].value - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_jsonl_writer_keeps_non_finite_values() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = JsonlSummaryWriter::new(dir.path()).unwrap();
            writer.add_scalars("accuracy", &[("test", f64::NAN)], 3).unwrap();
            writer.add_scalar("loss/train", f64::INFINITY, 4).unwrap();
            writer.add_scalar("loss/train", f64::NEG_INFINITY, 5).unwrap();
        }

        let raw = fs::read_to_string(dir.path().join(EVENTS_FILE)).unwrap();
        assert!(raw.lines().next().unwrap().contains(r#""value":"NaN""#));

        let events = JsonlSummaryWriter::read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].tag, "accuracy/test");
        assert!(events[0].value.is_nan());
        assert_eq!(events[1].value, f64::INFINITY);
        assert_eq!(events[2].value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_read_events_accepts_null_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(EVENTS_FILE),
            "{\"tag\":\"accuracy/test\",\"value\":null,\"step\":6,\"wall_time\":1.0}\n",
        )
        .unwrap();

        let events = JsonlSummaryWriter::read_events(dir.path()).unwrap();
        assert!(events[0].value.is_nan());
        assert_eq!(events[0].step, 6);
    }

    #[test]
    fn test_read_events_rejects_unknown_value_text() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(EVENTS_FILE),
            "{\"tag\":\"epoch\",\"value\":\"lots\",\"step\":1,\"wall_time\":1.0}\n",
        )
        .unwrap();

        assert!(matches!(
            JsonlSummaryWriter::read_events(dir.path()),
            Err(CifarError::Serialization(_))
        ));
    }

    #[test]
    fn test_jsonl_writer_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        for step in 0..2 {
            let mut writer = JsonlSummaryWriter::with_flush_secs(dir.path(), 0).unwrap();
            writer.add_scalar("epoch", step as f64, step).unwrap();
        }
        let events = JsonlSummaryWriter::read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 2);
    }
}
