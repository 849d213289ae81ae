//! Experiment configuration loaded from YAML.
//!
//! ```yaml
//! dataset:
//!   name: energy
//!   path: data/energy/
//!   freq: H
//! features:
//!   lags: [1, 24, 168]
//!   rolls:
//!     - {window: 24, stats: [mean, std]}
//!   fourier: {periods: [1, 7], k: 3}
//! models:
//!   seasonal_naive: {seasonal_period: 24}
//!   ets: {trend: add}
//! cv:
//!   n_splits: 4
//!   horizon: 24
//!   min_train_points: 720
//! anomaly:
//!   pi_alpha: 0.9
//! logging:
//!   experiment: energy-backtest
//! ```

use crate::anomaly::AnomalyConfig;
use crate::cv::{CvConfig, RollingOriginSplitter};
use crate::data::DatasetConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::models::ModelConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Run bookkeeping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Experiment the tracker files runs under.
    pub experiment: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Store each backtest's predictions as a run artifact.
    pub save_predictions: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            experiment: "ts-forecasting".to_string(),
            log_level: "INFO".to_string(),
            save_predictions: true,
        }
    }
}

/// Complete experiment configuration. Read once per run and not changed
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    /// Model tag to its parameters (`null` for defaults).
    #[serde(default)]
    pub models: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub cv: CvConfig,
    #[serde(default)]
    pub anomaly: Option<AnomalyConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check every section for values that would fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.horizon == 0 {
            return Err(ForecastError::Configuration(
                "dataset.horizon must be positive".to_string(),
            ));
        }
        RollingOriginSplitter::from_config(&self.cv)?;

        let features = &self.features;
        if let Some(lag) = features.lags.iter().find(|&&l| l == 0) {
            return Err(ForecastError::Configuration(format!(
                "features.lags must be positive, got {lag}"
            )));
        }
        for roll in &features.rolls {
            if roll.window == 0 || roll.stats.is_empty() {
                return Err(ForecastError::Configuration(format!(
                    "rolling window {} needs a positive size and at least one statistic",
                    roll.window
                )));
            }
        }
        if let Some(fourier) = &features.fourier {
            let periods_ok = fourier.periods.iter().all(|p| p.is_finite() && *p > 0.0);
            if fourier.k == 0 || !periods_ok {
                return Err(ForecastError::Configuration(
                    "fourier needs k >= 1 and positive periods".to_string(),
                ));
            }
        }
        for promo in &features.promos {
            promo.window()?;
        }

        for (tag, params) in &self.models {
            ModelConfig::from_tag(tag, params)?;
        }
        if let Some(anomaly) = &self.anomaly {
            if !(anomaly.pi_alpha > 0.0 && anomaly.pi_alpha < 1.0) {
                return Err(ForecastError::Configuration(format!(
                    "anomaly.pi_alpha must be in (0, 1), got {}",
                    anomaly.pi_alpha
                )));
            }
            if let Some(residual) = &anomaly.residual {
                residual.validate()?;
            }
            if let Some(iforest) = &anomaly.iforest {
                iforest.validate()?;
            }
        }
        self.logging
            .log_level
            .parse::<tracing::Level>()
            .map_err(|_| {
                ForecastError::Configuration(format!(
                    "unknown log level '{}'",
                    self.logging.log_level
                ))
            })?;
        Ok(())
    }

    /// Model configured under `tag`, with default parameters when the tag
    /// has no entry.
    pub fn model(&self, tag: &str) -> Result<ModelConfig> {
        let params = self
            .models
            .get(tag)
            .cloned()
            .unwrap_or(serde_yaml::Value::Null);
        ModelConfig::from_tag(tag, &params)
    }

    /// Every configured model, by tag.
    pub fn model_configs(&self) -> Result<Vec<(String, ModelConfig)>> {
        self.models
            .iter()
            .map(|(tag, params)| Ok((tag.clone(), ModelConfig::from_tag(tag, params)?)))
            .collect()
    }

    /// Flat `section.key` parameters for a tracker. Lists are written as
    /// JSON.
    pub fn to_params(&self) -> Result<BTreeMap<String, String>> {
        let value = serde_yaml::to_value(self)?;
        let mut params = BTreeMap::new();
        flatten("", &value, &mut params)?;
        Ok(params)
    }
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut BTreeMap<String, String>) -> Result<()> {
    use serde_yaml::Value;
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => scalar(other)?,
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out)?;
            }
        }
        Value::Sequence(_) => {
            out.insert(prefix.to_string(), serde_json::to_string(value)?);
        }
        Value::Tagged(tagged) => flatten(prefix, &tagged.value, out)?,
        other => {
            out.insert(prefix.to_string(), scalar(other)?);
        }
    }
    Ok(())
}

fn scalar(value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    })
}
