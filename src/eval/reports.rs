//! Markdown reports for model comparisons and anomaly runs.

use super::compare::{format_metric, Leaderboard};
use crate::anomaly::AnomalyRecord;
use crate::error::Result;
use crate::utils::stats::mean;
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Rows shown in the anomaly report unless another count is requested.
pub const DEFAULT_TOP_K: usize = 20;

/// Render a Markdown table; short rows are padded with empty cells.
pub fn markdown_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "| {} |", headers.join(" | "));
    let _ = writeln!(
        out,
        "|{}|",
        headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    );
    for row in rows {
        let cells: Vec<&str> = (0..headers.len())
            .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out
}

fn write_report(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)?;
    Ok(())
}

/// Leaderboard table followed by the best model by MAPE.
pub fn comparison_report(leaderboard: &Leaderboard, title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title}\n");
    let _ = writeln!(out, "Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "## Leaderboard\n");
    out.push_str(&markdown_table(&leaderboard.headers(), &leaderboard.rows()));
    let _ = writeln!(out, "\n## Analysis\n");

    let best = leaderboard
        .best()
        .and_then(|entry| entry.metric("mape").map(|mape| (entry, mape)));
    if let Some((entry, mape)) = best {
        let _ = writeln!(out, "**Best Model**: {} (MAPE: {:.2}%)\n", entry.model, mape);
    }

    let _ = writeln!(out, "### Observations\n");
    let _ = writeln!(out, "- Models ranked by MAPE (lower is better)");
    let _ = writeln!(out, "- Prediction intervals evaluated for coverage");
    out
}

/// Write [`comparison_report`] to `path`, creating parent directories.
pub fn write_comparison_report(leaderboard: &Leaderboard, path: &Path, title: &str) -> Result<()> {
    write_report(path, &comparison_report(leaderboard, title))
}

/// Summary figures of an anomaly run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalySummary {
    pub total: usize,
    pub flagged: usize,
    /// Mean of the finite scores.
    pub mean_score: f64,
    pub max_score: f64,
    /// Flagged share of all rows, in percent.
    pub rate: f64,
}

impl AnomalySummary {
    pub fn from_records(records: &[AnomalyRecord]) -> Self {
        let scores: Vec<f64> = records
            .iter()
            .map(|r| r.anomaly_score)
            .filter(|s| s.is_finite())
            .collect();
        let flagged = records.iter().filter(|r| r.is_anomaly).count();
        Self {
            total: records.len(),
            flagged,
            mean_score: mean(&scores),
            max_score: scores.iter().copied().fold(f64::NAN, f64::max),
            rate: if records.is_empty() {
                0.0
            } else {
                flagged as f64 / records.len() as f64 * 100.0
            },
        }
    }
}

/// Records with the `k` highest finite scores, highest first.
pub fn top_anomalies(records: &[AnomalyRecord], k: usize) -> Vec<&AnomalyRecord> {
    let mut ranked: Vec<&AnomalyRecord> = records
        .iter()
        .filter(|r| r.anomaly_score.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.anomaly_score.total_cmp(&a.anomaly_score));
    ranked.truncate(k);
    ranked
}

/// Total flagged, the `top_k` highest scores and score statistics.
pub fn anomaly_report(records: &[AnomalyRecord], top_k: usize) -> String {
    let summary = AnomalySummary::from_records(records);
    let mut out = String::new();
    let _ = writeln!(out, "# Anomaly Detection Report\n");
    let _ = writeln!(out, "Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "**Total Anomalies Detected**: {}\n", summary.flagged);
    let _ = writeln!(out, "## Top {top_k} Anomalies\n");

    let with_series = records.iter().any(|r| r.series_id.is_some());
    let mut headers: Vec<String> = Vec::new();
    if with_series {
        headers.push("series_id".to_string());
    }
    headers.extend(["ds", "y", "yhat", "anomaly_score"].map(String::from));
    let rows: Vec<Vec<String>> = top_anomalies(records, top_k)
        .into_iter()
        .map(|r| {
            let mut row = Vec::with_capacity(headers.len());
            if with_series {
                row.push(r.series_id.clone().unwrap_or_default());
            }
            row.push(r.ds.format("%Y-%m-%d %H:%M:%S").to_string());
            row.push(format_metric(Some(r.y)));
            row.push(format_metric(Some(r.yhat)));
            row.push(format_metric(Some(r.anomaly_score)));
            row
        })
        .collect();
    out.push_str(&markdown_table(&headers, &rows));

    let _ = writeln!(out, "\n## Statistics\n");
    let _ = writeln!(out, "- Mean anomaly score: {:.3}", summary.mean_score);
    let _ = writeln!(out, "- Max anomaly score: {:.3}", summary.max_score);
    let _ = writeln!(out, "- Anomaly rate: {:.2}%", summary.rate);
    out
}

/// Write [`anomaly_report`] to `path`, creating parent directories.
pub fn write_anomaly_report(records: &[AnomalyRecord], path: &Path, top_k: usize) -> Result<()> {
    write_report(path, &anomaly_report(records, top_k))
}
