//! Anomaly detection on backtest predictions.
//!
//! Anomalies are actuals that a forecast explains badly: the residual is
//! extreme relative to the other residuals, the actual falls outside the
//! prediction interval, or an isolation forest over `(y, y - yhat)` finds the
//! row easy to separate.

pub mod isolation_forest;
pub mod residual;

pub use isolation_forest::{detect_isolation_forest, IsolationForest, IsolationForestConfig};
pub use residual::{detect_interval, detect_residual, AnomalyFlags, ResidualConfig, ResidualMethod};

use crate::core::Frame;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Anomaly section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Coverage of the prediction intervals used for interval flags.
    #[serde(default = "default_pi_alpha")]
    pub pi_alpha: f64,
    /// Residual detector; takes precedence over the other detectors.
    #[serde(default)]
    pub residual: Option<ResidualConfig>,
    /// Isolation forest, used when no residual detector is set. Interval
    /// flags are used when neither is set.
    #[serde(default)]
    pub iforest: Option<IsolationForestConfig>,
}

fn default_pi_alpha() -> f64 {
    0.9
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            pi_alpha: default_pi_alpha(),
            residual: None,
            iforest: None,
        }
    }
}

/// One scored prediction row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub series_id: Option<String>,
    pub ds: DateTime<Utc>,
    pub y: f64,
    pub yhat: f64,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// Score every row of a predictions frame (`y`, `yhat` and, for interval
/// flags, `yhat_lower`/`yhat_upper`).
pub fn detect_anomalies(predictions: &Frame, config: &AnomalyConfig) -> Result<Vec<AnomalyRecord>> {
    let y = predictions.target();
    let yhat = predictions.require_column("yhat")?;

    let flags = match (&config.residual, &config.iforest) {
        (Some(residual), _) => detect_residual(y, yhat, residual)?,
        (None, Some(iforest)) => forest_flags(y, yhat, iforest)?,
        (None, None) => {
            let lower = predictions.require_column("yhat_lower")?;
            let upper = predictions.require_column("yhat_upper")?;
            AnomalyFlags {
                is_anomaly: detect_interval(y, lower, upper)?,
                scores: y.iter().zip(yhat).map(|(a, p)| (a - p).abs()).collect(),
            }
        }
    };

    Ok((0..predictions.len())
        .map(|i| AnomalyRecord {
            series_id: predictions.series_id(i).map(String::from),
            ds: predictions.timestamps()[i],
            y: y[i],
            yhat: yhat[i],
            anomaly_score: flags.scores[i],
            is_anomaly: flags.is_anomaly[i],
        })
        .collect())
}

/// Isolation forest over the finite `(y, y - yhat)` pairs. Other rows get a
/// `NaN` score and are never flagged.
fn forest_flags(y: &[f64], yhat: &[f64], config: &IsolationForestConfig) -> Result<AnomalyFlags> {
    let mut flags = AnomalyFlags {
        is_anomaly: vec![false; y.len()],
        scores: vec![f64::NAN; y.len()],
    };
    let (rows, points): (Vec<usize>, Vec<Vec<f64>>) = y
        .iter()
        .zip(yhat)
        .enumerate()
        .filter(|(_, (a, p))| a.is_finite() && p.is_finite())
        .map(|(i, (a, p))| (i, vec![*a, a - p]))
        .unzip();
    if points.len() < 2 {
        debug!(rows = points.len(), "too few scored rows for an isolation forest");
        return Ok(flags);
    }
    let found = detect_isolation_forest(&points, config)?;
    for (k, &row) in rows.iter().enumerate() {
        flags.is_anomaly[row] = found.is_anomaly[k];
        flags.scores[row] = found.scores[k];
    }
    Ok(flags)
}
