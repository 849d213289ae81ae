//! Forecast evaluation: accuracy metrics, model comparison and reports.

pub mod compare;
pub mod metrics;
pub mod reports;

pub use compare::{
    compare_models, create_leaderboard, leaderboard_from_backtests, ComparisonRow, Leaderboard,
    LeaderboardEntry, ModelComparison, DEFAULT_METRICS,
};
pub use metrics::{calculate_metrics, coverage, mae, mape, mase, nan_mean, rmse, smape, AccuracyMetrics};
pub use reports::{
    anomaly_report, comparison_report, markdown_table, top_anomalies, write_anomaly_report,
    write_comparison_report, AnomalySummary, DEFAULT_TOP_K,
};
