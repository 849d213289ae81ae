//! Experiment tracking: parameters, metrics and artifacts per run.
//!
//! A [`Tracker`] hands out a [`RunHandle`] from [`Tracker::start_run`]; every
//! log call names the run it belongs to and [`Tracker::end_run`] consumes the
//! handle, so a finished run cannot be logged to again.
//!
//! [`FileTracker`] writes one directory per run:
//!
//! ```text
//! <root>/<experiment>/<run_id>/
//!     run.json         name, status, start and end timestamps
//!     params.json      flat key/value parameters
//!     metrics.jsonl    one JSON object per logged batch, with its step
//!     artifacts/<name>
//! ```

use crate::core::Frame;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Flat run parameters.
pub type Params = BTreeMap<String, String>;

/// Metric values of one logged batch.
pub type Metrics = BTreeMap<String, f64>;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Metadata stored for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment: String,
    pub name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Open run. Only the tracker that created it can end it.
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    run_id: String,
    experiment: String,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }
}

/// One line of `metrics.jsonl`. Non-finite values are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsBatch {
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl MetricsBatch {
    fn new(step: u64, metrics: &Metrics) -> Self {
        Self {
            step,
            timestamp: Utc::now(),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.clone(), v.is_finite().then_some(*v)))
                .collect(),
        }
    }
}

/// Sink for experiment runs.
pub trait Tracker {
    fn start_run(&mut self, experiment: &str, name: &str) -> Result<RunHandle>;

    /// Merge `params` into the run's parameters.
    fn log_params(&mut self, run: &RunHandle, params: &Params) -> Result<()>;

    /// Record a batch of metrics. Without `step` the batch takes the step
    /// after the previous one (starting at 0).
    fn log_metrics(&mut self, run: &RunHandle, metrics: &Metrics, step: Option<u64>) -> Result<()>;

    fn log_artifact(&mut self, run: &RunHandle, name: &str, contents: &[u8]) -> Result<()>;

    /// Store a frame as a CSV artifact.
    fn log_frame(&mut self, run: &RunHandle, name: &str, frame: &Frame) -> Result<()> {
        let csv = frame.to_csv_string()?;
        self.log_artifact(run, name, csv.as_bytes())
    }

    fn end_run(&mut self, run: RunHandle, status: RunStatus) -> Result<()>;
}

fn new_run_id(counter: &mut u64) -> String {
    *counter += 1;
    format!("{}-{:04}", Utc::now().format("%Y%m%dT%H%M%S"), counter)
}

/// Artifact names are relative paths without `..`.
fn check_artifact_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let plain = !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(ForecastError::Configuration(format!(
            "invalid artifact name '{name}'"
        )));
    }
    Ok(())
}

/// Step counters per open run.
#[derive(Debug, Default)]
struct Steps(HashMap<String, u64>);

impl Steps {
    fn next(&mut self, run: &RunHandle, step: Option<u64>) -> u64 {
        let counter = self.0.entry(run.run_id.clone()).or_insert(0);
        let step = step.unwrap_or(*counter);
        *counter = step + 1;
        step
    }
}

/// Tracker writing runs to a directory tree.
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    counter: u64,
    steps: Steps,
    records: HashMap<String, RunRecord>,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: 0,
            steps: Steps::default(),
            records: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a run.
    pub fn run_dir(&self, run: &RunHandle) -> PathBuf {
        self.root.join(&run.experiment).join(&run.run_id)
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        fs::write(path, text)?;
        Ok(())
    }

    fn record(&self, run: &RunHandle) -> Result<&RunRecord> {
        self.records
            .get(&run.run_id)
            .ok_or_else(|| ForecastError::Configuration(format!("unknown run '{}'", run.run_id)))
    }
}

impl Tracker for FileTracker {
    fn start_run(&mut self, experiment: &str, name: &str) -> Result<RunHandle> {
        check_artifact_name(experiment)?;
        let mut run_id = new_run_id(&mut self.counter);
        while self.root.join(experiment).join(&run_id).exists() {
            run_id = new_run_id(&mut self.counter);
        }
        let handle = RunHandle {
            run_id: run_id.clone(),
            experiment: experiment.to_string(),
        };
        let dir = self.run_dir(&handle);
        fs::create_dir_all(dir.join("artifacts"))?;

        let record = RunRecord {
            run_id: run_id.clone(),
            experiment: experiment.to_string(),
            name: name.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        Self::write_json(&dir.join("run.json"), &record)?;
        self.records.insert(run_id, record);
        info!(experiment, run = name, dir = %dir.display(), "started run");
        Ok(handle)
    }

    fn log_params(&mut self, run: &RunHandle, params: &Params) -> Result<()> {
        self.record(run)?;
        let path = self.run_dir(run).join("params.json");
        let mut merged: Params = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Params::new()
        };
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::write_json(&path, &merged)
    }

    fn log_metrics(&mut self, run: &RunHandle, metrics: &Metrics, step: Option<u64>) -> Result<()> {
        self.record(run)?;
        let batch = MetricsBatch::new(self.steps.next(run, step), metrics);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_dir(run).join("metrics.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(&batch)?)?;
        debug!(run = %run.run_id, step = batch.step, n = metrics.len(), "logged metrics");
        Ok(())
    }

    fn log_artifact(&mut self, run: &RunHandle, name: &str, contents: &[u8]) -> Result<()> {
        self.record(run)?;
        check_artifact_name(name)?;
        let path = self.run_dir(run).join("artifacts").join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(())
    }

    fn end_run(&mut self, run: RunHandle, status: RunStatus) -> Result<()> {
        let mut record = self.record(&run)?.clone();
        record.status = status;
        record.end_time = Some(Utc::now());
        Self::write_json(&self.run_dir(&run).join("run.json"), &record)?;
        self.records.remove(&run.run_id);
        self.steps.0.remove(&run.run_id);
        info!(run = %record.name, status = ?status, "ended run");
        Ok(())
    }
}

/// Everything logged to one run of a [`MemoryTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRun {
    pub record: RunRecord,
    pub params: Params,
    pub metrics: Vec<(u64, Metrics)>,
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

impl MemoryRun {
    /// Last logged value of a metric.
    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().rev().find_map(|(_, m)| m.get(name).copied())
    }
}

/// Tracker keeping runs in memory.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    counter: u64,
    steps: Steps,
    runs: Vec<MemoryRun>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// All runs in start order, open or ended.
    pub fn runs(&self) -> &[MemoryRun] {
        &self.runs
    }

    pub fn run_named(&self, name: &str) -> Option<&MemoryRun> {
        self.runs.iter().find(|r| r.record.name == name)
    }

    fn open_run(&mut self, run: &RunHandle) -> Result<&mut MemoryRun> {
        self.runs
            .iter_mut()
            .find(|r| r.record.run_id == run.run_id && r.record.status == RunStatus::Running)
            .ok_or_else(|| ForecastError::Configuration(format!("unknown run '{}'", run.run_id)))
    }
}

impl Tracker for MemoryTracker {
    fn start_run(&mut self, experiment: &str, name: &str) -> Result<RunHandle> {
        let run_id = new_run_id(&mut self.counter);
        self.runs.push(MemoryRun {
            record: RunRecord {
                run_id: run_id.clone(),
                experiment: experiment.to_string(),
                name: name.to_string(),
                status: RunStatus::Running,
                start_time: Utc::now(),
                end_time: None,
            },
            params: Params::new(),
            metrics: Vec::new(),
            artifacts: BTreeMap::new(),
        });
        Ok(RunHandle {
            run_id,
            experiment: experiment.to_string(),
        })
    }

    fn log_params(&mut self, run: &RunHandle, params: &Params) -> Result<()> {
        let entry = self.open_run(run)?;
        entry.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn log_metrics(&mut self, run: &RunHandle, metrics: &Metrics, step: Option<u64>) -> Result<()> {
        self.open_run(run)?;
        let step = self.steps.next(run, step);
        self.open_run(run)?.metrics.push((step, metrics.clone()));
        Ok(())
    }

    fn log_artifact(&mut self, run: &RunHandle, name: &str, contents: &[u8]) -> Result<()> {
        check_artifact_name(name)?;
        self.open_run(run)?
            .artifacts
            .insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn end_run(&mut self, run: RunHandle, status: RunStatus) -> Result<()> {
        let entry = self.open_run(&run)?;
        entry.record.status = status;
        entry.record.end_time = Some(Utc::now());
        Ok(())
    }
}
