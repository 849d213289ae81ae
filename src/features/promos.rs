//! Promotion window indicators.

use super::FeatureColumns;
use crate::core::parse_timestamp;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A promotion active between `start` and `end`, both inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoSpec {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl PromoSpec {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parsed bounds; a bare date means midnight UTC.
    pub fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_timestamp(&self.start)
            .map_err(|e| ForecastError::Configuration(format!("promo start: {e}")))?;
        let end = parse_timestamp(&self.end)
            .map_err(|e| ForecastError::Configuration(format!("promo end: {e}")))?;
        if start > end {
            return Err(ForecastError::Configuration(format!(
                "promo starts after it ends ({} > {})",
                self.start, self.end
            )));
        }
        Ok((start, end))
    }

    /// Column name: `promo_{name}`, with `promo_{YYYYMMDD}` as the default
    /// name.
    pub fn column_name(&self) -> Result<String> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => format!("promo_{}", self.window()?.0.format("%Y%m%d")),
        };
        Ok(format!("promo_{name}"))
    }
}

/// One 0/1 column per promotion.
pub fn promo_features(timestamps: &[DateTime<Utc>], promos: &[PromoSpec]) -> Result<FeatureColumns> {
    promos
        .iter()
        .map(|promo| -> Result<(String, Vec<f64>)> {
            let (start, end) = promo.window()?;
            let values = timestamps
                .iter()
                .map(|ts| if *ts >= start && *ts <= end { 1.0 } else { 0.0 })
                .collect();
            Ok((promo.column_name()?, values))
        })
        .collect()
}
