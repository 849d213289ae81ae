//! Isolation forest: rows that random axis-aligned splits separate from the
//! rest in few steps are anomalous.

use super::AnomalyFlags;
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    /// Rows drawn without replacement for each tree, capped at the number
    /// of rows.
    pub max_samples: usize,
    /// Expected share of anomalies; the highest-scoring share is flagged.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_samples: 256,
            contamination: 0.02,
            seed: 42,
        }
    }
}

impl IsolationForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 || self.max_samples == 0 {
            return Err(ForecastError::Configuration(
                "isolation forest needs n_estimators >= 1 and max_samples >= 1".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ForecastError::Configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn grow(rows: &[Vec<f64>], indices: &[usize], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || indices.len() <= 1 {
            return Node::Leaf { size: indices.len() };
        }
        let feature = rng.gen_range(0..rows[indices[0]].len());
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(rows[i][feature]), hi.max(rows[i][feature]))
        });
        if !(hi > lo) {
            return Node::Leaf { size: indices.len() };
        }
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| rows[i][feature] < threshold);
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size: indices.len() };
        }
        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::grow(rows, &left, depth + 1, max_depth, rng)),
            right: Box::new(Node::grow(rows, &right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Mean depth of an unsuccessful search in a binary search tree of `n`
/// keys; normalises path lengths.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Rows must be non-empty, equally wide and finite.
fn check_rows(rows: &[Vec<f64>]) -> Result<usize> {
    let width = rows.first().map(Vec::len).ok_or(ForecastError::EmptyData)?;
    if width == 0 {
        return Err(ForecastError::Data("rows have no features".to_string()));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ForecastError::DimensionMismatch {
                expected: width,
                got: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Data(format!("row {i} has a non-finite value")));
        }
    }
    Ok(width)
}

/// Fitted isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    trees: Vec<Node>,
    width: usize,
    sample_size: usize,
    threshold: Option<f64>,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            width: 0,
            sample_size: 0,
            threshold: None,
        }
    }

    pub fn fit(&mut self, rows: &[Vec<f64>]) -> Result<()> {
        self.config.validate()?;
        let width = check_rows(rows)?;
        if rows.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: rows.len(),
            });
        }

        let sample_size = self.config.max_samples.min(rows.len()).max(2);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.trees = (0..self.config.n_estimators)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, rows.len(), sample_size).into_vec();
                Node::grow(rows, &sample, 0, max_depth, &mut rng)
            })
            .collect();
        self.width = width;
        self.sample_size = sample_size;

        let mut scores = self.score_samples(rows)?;
        scores.sort_by(|a, b| b.total_cmp(a));
        let flagged = ((self.config.contamination * rows.len() as f64).round() as usize).clamp(1, rows.len());
        self.threshold = Some(scores[flagged - 1]);
        debug!(
            trees = self.trees.len(),
            sample_size,
            threshold = scores[flagged - 1],
            "fitted isolation forest"
        );
        Ok(())
    }

    /// Anomaly score in `(0, 1]` per row, `2^(-E[h(x)] / c(ψ))`; higher is
    /// more anomalous.
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(ForecastError::FitRequired);
        }
        let width = check_rows(rows)?;
        if width != self.width {
            return Err(ForecastError::DimensionMismatch {
                expected: self.width,
                got: width,
            });
        }
        let norm = average_path_length(self.sample_size);
        Ok(rows
            .iter()
            .map(|row| {
                let mean_depth =
                    self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
                2.0_f64.powf(-mean_depth / norm)
            })
            .collect())
    }

    /// Score at or above which a row is flagged.
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<AnomalyFlags> {
        let threshold = self.threshold.ok_or(ForecastError::FitRequired)?;
        let scores = self.score_samples(rows)?;
        Ok(AnomalyFlags {
            is_anomaly: scores.iter().map(|s| *s >= threshold).collect(),
            scores,
        })
    }
}

/// Fit a forest on `rows` and flag the most isolated ones.
pub fn detect_isolation_forest(rows: &[Vec<f64>], config: &IsolationForestConfig) -> Result<AnomalyFlags> {
    let mut forest = IsolationForest::new(config.clone());
    forest.fit(rows)?;
    forest.predict(rows)
}
