//! # forecast-lab
//!
//! Time series forecasting experimentation toolkit.
//!
//! Provides leakage-safe feature engineering for panel data, a
//! rolling-origin cross-validation splitter, baseline, exponential
//! smoothing and gradient-boosted models, backtests with accuracy metrics,
//! leaderboards and Markdown reports, residual anomaly detection and
//! experiment tracking.
//!
//! # Example
//!
//! ```
//! use forecast_lab::prelude::*;
//! use forecast_lab::data::{synthetic_panel, SyntheticConfig};
//!
//! let panel = synthetic_panel(&SyntheticConfig { length: 120, ..SyntheticConfig::default() }).unwrap();
//! let splitter = RollingOriginSplitter::new(3, 14).unwrap().with_min_train_points(60);
//! let model = ModelConfig::from_tag("seasonal_naive", &serde_yaml::Value::Null).unwrap();
//! let config = BacktestConfig { seasonal_period: 7, ..BacktestConfig::default() };
//!
//! let result = backtest(&panel, &splitter, &model.spec("snaive"), &config).unwrap();
//! assert_eq!(result.n_folds(), 3);
//! assert!(result.metrics.unwrap().mape < 20.0);
//! ```

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod anomaly;
pub mod config;
pub mod core;
pub mod cv;
pub mod data;
pub mod error;
pub mod eval;
pub mod features;
pub mod models;
pub mod tracking;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::core::{Forecast, Frame, Frequency, TimeSeries};
    pub use crate::cv::{backtest, BacktestConfig, BacktestResult, CvConfig, RollingOriginSplitter};
    pub use crate::error::{ForecastError, Result};
    pub use crate::eval::{calculate_metrics, create_leaderboard, AccuracyMetrics, Leaderboard};
    pub use crate::features::{build_features, FeatureConfig};
    pub use crate::models::{Forecaster, ModelConfig, ModelSpec};
    pub use crate::tracking::{FileTracker, MemoryTracker, RunStatus, Tracker};
}
