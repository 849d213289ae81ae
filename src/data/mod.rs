//! Dataset loading, synthetic panels and frame-level transforms.

pub mod loaders;
pub mod synthetic;
pub mod transforms;

pub use loaders::{load_dataset, load_long_csv, load_m5, load_opsd, CsvSchema};
pub use synthetic::{synthetic_panel, synthetic_weather, SyntheticConfig, WEATHER_COLUMNS};
pub use transforms::{align_calendars, fill_time_gaps, infer_frequency, FillMethod, StandardScaler};

use crate::core::Frequency;
use serde::{Deserialize, Serialize};

/// Dataset section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// `m5`/`retail` and `opsd`/`energy` select the bundled loaders; any
    /// other name reads a long CSV file at `path`.
    pub name: String,
    /// Data directory or CSV file, relative to the configuration file.
    pub path: String,
    #[serde(default)]
    pub freq: Option<Frequency>,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_id_col")]
    pub id_col: String,
    #[serde(default = "default_ts_col")]
    pub ts_col: String,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

fn default_target() -> String {
    "y".to_string()
}

fn default_id_col() -> String {
    "series_id".to_string()
}

fn default_ts_col() -> String {
    "ds".to_string()
}

fn default_horizon() -> usize {
    28
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            freq: None,
            target: default_target(),
            id_col: default_id_col(),
            ts_col: default_ts_col(),
            horizon: default_horizon(),
        }
    }

    /// Column layout of a long CSV file for this dataset.
    pub fn schema(&self) -> CsvSchema {
        CsvSchema {
            id_col: Some(self.id_col.clone()),
            ts_col: self.ts_col.clone(),
            target: self.target.clone(),
            dedup_last: false,
        }
    }
}
