//! Time-series cross-validation: fold generation and model backtests.

pub mod backtest;
pub mod splits;

pub use backtest::{backtest, BacktestConfig, BacktestResult, FoldScore, SeriesScore};
pub use splits::{
    train_test_split, CvConfig, CvMethod, Fold, Folds, RollingOriginSplitter, SeriesBounds,
    WindowBounds,
};
