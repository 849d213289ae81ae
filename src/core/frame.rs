//! Long-format panel table: one row per observation, optional series id,
//! timestamp, target and `f64` covariate columns.
//!
//! Missing values are stored as `NaN`. Rows are kept in the order they were
//! given; components that need per-series time order compute a permutation
//! with [`Frame::sort_order`] instead of reordering the table.

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

/// Named covariate column.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<f64>,
}

/// Contiguous rows of one series inside a sorted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRange {
    /// Series identifier, `None` for a single-series frame.
    pub id: Option<String>,
    pub rows: Range<usize>,
}

impl SeriesRange {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory long-format table.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    series_ids: Option<Vec<String>>,
    timestamps: Vec<DateTime<Utc>>,
    target_name: String,
    target: Vec<f64>,
    columns: Vec<Column>,
}

impl Frame {
    /// Create a frame. Without `series_ids` the whole table is one series.
    pub fn new(
        series_ids: Option<Vec<String>>,
        timestamps: Vec<DateTime<Utc>>,
        target_name: impl Into<String>,
        target: Vec<f64>,
    ) -> Result<Self> {
        if target.len() != timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: target.len(),
            });
        }
        if let Some(ids) = &series_ids {
            if ids.len() != timestamps.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: timestamps.len(),
                    got: ids.len(),
                });
            }
        }
        Ok(Self {
            series_ids,
            timestamps,
            target_name: target_name.into(),
            target,
            columns: Vec::new(),
        })
    }

    /// Builder-style [`Frame::add_column`].
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.add_column(name, values)?;
        Ok(self)
    }

    /// Add a covariate column, replacing any column (or the target) with the
    /// same name.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        let name = name.into();
        if name == self.target_name {
            self.target = values;
        } else if let Some(col) = self.columns.iter_mut().find(|c| c.name == name) {
            col.values = values;
        } else {
            self.columns.push(Column { name, values });
        }
        Ok(())
    }

    /// Values of the target or a covariate by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        if name == self.target_name {
            return Some(&self.target);
        }
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`Frame::column`], failing with a configuration error.
    pub fn require_column(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| ForecastError::missing_column(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Target name followed by covariate names.
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(self.target_name.as_str())
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Covariate names in insertion order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn series_ids(&self) -> Option<&[String]> {
        self.series_ids.as_deref()
    }

    pub fn series_id(&self, row: usize) -> Option<&str> {
        self.series_ids
            .as_ref()
            .and_then(|ids| ids.get(row))
            .map(|s| s.as_str())
    }

    pub fn is_panel(&self) -> bool {
        self.series_ids.is_some()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn key_cmp(&self, a: usize, b: usize) -> Ordering {
        let by_id = match &self.series_ids {
            Some(ids) => ids[a].cmp(&ids[b]),
            None => Ordering::Equal,
        };
        by_id.then(self.timestamps[a].cmp(&self.timestamps[b]))
    }

    fn describe_row(&self, row: usize) -> String {
        match self.series_id(row) {
            Some(id) => format!("series '{}' at {}", id, self.timestamps[row]),
            None => format!("{}", self.timestamps[row]),
        }
    }

    /// Stable permutation ordering rows by `(series_id, timestamp)`.
    ///
    /// Fails with a data error when two rows share the same key.
    pub fn sort_order(&self) -> Result<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.key_cmp(a, b));
        if let Some(w) = order
            .windows(2)
            .find(|w| self.key_cmp(w[0], w[1]) == Ordering::Equal)
        {
            return Err(ForecastError::Data(format!(
                "duplicate timestamp for {}",
                self.describe_row(w[1])
            )));
        }
        Ok(order)
    }

    /// Whether rows are strictly ordered by `(series_id, timestamp)`.
    pub fn is_sorted(&self) -> bool {
        (1..self.len()).all(|i| self.key_cmp(i - 1, i) == Ordering::Less)
    }

    /// Copy ordered by `(series_id, timestamp)`.
    pub fn sorted(&self) -> Result<Frame> {
        if self.is_sorted() {
            return Ok(self.clone());
        }
        let order = self.sort_order()?;
        Ok(self.take(&order))
    }

    /// Row indices of every series in time order, series in id order.
    /// The frame itself is not reordered.
    pub fn series_row_groups(&self) -> Result<Vec<Vec<usize>>> {
        let order = self.sort_order()?;
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for idx in order {
            match groups.last_mut() {
                Some(group) if self.series_id(group[0]) == self.series_id(idx) => group.push(idx),
                _ => groups.push(vec![idx]),
            }
        }
        Ok(groups)
    }

    /// Runs of equal series id, in row order. For a sorted frame these are
    /// the series in id order.
    pub fn series_ranges(&self) -> Vec<SeriesRange> {
        let Some(ids) = &self.series_ids else {
            if self.is_empty() {
                return Vec::new();
            }
            return vec![SeriesRange {
                id: None,
                rows: 0..self.len(),
            }];
        };
        let mut ranges = Vec::new();
        let mut start = 0;
        for i in 1..=ids.len() {
            if i == ids.len() || ids[i] != ids[start] {
                ranges.push(SeriesRange {
                    id: Some(ids[start].clone()),
                    rows: start..i,
                });
                start = i;
            }
        }
        ranges
    }

    /// New frame with the given rows, in the given order.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    pub fn take(&self, rows: &[usize]) -> Frame {
        let pick = |v: &[f64]| rows.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Frame {
            series_ids: self
                .series_ids
                .as_ref()
                .map(|ids| rows.iter().map(|&i| ids[i].clone()).collect()),
            timestamps: rows.iter().map(|&i| self.timestamps[i]).collect(),
            target_name: self.target_name.clone(),
            target: pick(&self.target),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: pick(&c.values),
                })
                .collect(),
        }
    }

    /// Rows of `range` as a new frame.
    pub fn slice(&self, range: Range<usize>) -> Frame {
        let rows: Vec<usize> = range.collect();
        self.take(&rows)
    }

    /// Stack frames with the same schema.
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let (first, rest) = frames.split_first().ok_or(ForecastError::EmptyData)?;
        let mut out = first.clone();
        for frame in rest {
            if frame.target_name != out.target_name
                || frame.feature_names() != out.feature_names()
                || frame.is_panel() != out.is_panel()
            {
                return Err(ForecastError::Configuration(
                    "cannot concatenate frames with different columns".to_string(),
                ));
            }
            if let (Some(dst), Some(src)) = (&mut out.series_ids, &frame.series_ids) {
                dst.extend(src.iter().cloned());
            }
            out.timestamps.extend_from_slice(&frame.timestamps);
            out.target.extend_from_slice(&frame.target);
            for (dst, src) in out.columns.iter_mut().zip(&frame.columns) {
                dst.values.extend_from_slice(&src.values);
            }
        }
        Ok(out)
    }

    /// Drop rows holding `NaN` in any of `columns`, or in any column at all
    /// when `columns` is `None`.
    pub fn drop_incomplete(&self, columns: Option<&[&str]>) -> Result<Frame> {
        let checked: Vec<&[f64]> = match columns {
            Some(names) => names
                .iter()
                .map(|n| self.require_column(n))
                .collect::<Result<_>>()?,
            None => std::iter::once(self.target.as_slice())
                .chain(self.columns.iter().map(|c| c.values.as_slice()))
                .collect(),
        };
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| checked.iter().all(|col| !col[i].is_nan()))
            .collect();
        Ok(self.take(&keep))
    }

    /// Keep the last row for each `(series_id, timestamp)` key; the result is
    /// sorted.
    pub fn dedup_last(&self) -> Frame {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.key_cmp(a, b));
        let mut keep: Vec<usize> = Vec::with_capacity(order.len());
        for idx in order {
            match keep.last_mut() {
                // stable sort keeps input order among equal keys
                Some(last) if self.key_cmp(*last, idx) == Ordering::Equal => *last = idx,
                _ => keep.push(idx),
            }
        }
        self.take(&keep)
    }

    /// Build a [`TimeSeries`] from one series' rows, carrying the named
    /// columns as regressors. Rows must be time-ordered.
    pub fn to_time_series(&self, rows: Range<usize>, regressors: &[&str]) -> Result<TimeSeries> {
        if rows.end > self.len() || rows.start > rows.end {
            return Err(ForecastError::InsufficientData {
                needed: rows.end,
                got: self.len(),
            });
        }
        let mut series = TimeSeries::new(
            self.timestamps[rows.clone()].to_vec(),
            self.target[rows.clone()].to_vec(),
        )?;
        if let Some(id) = self.series_id(rows.start) {
            series = series.with_id(id);
        }
        for name in regressors {
            let values = self.require_column(name)?[rows.clone()].to_vec();
            series = series.with_regressor(*name, values)?;
        }
        Ok(series)
    }

    /// Write as CSV: `series_id` (panel only), `ds`, target, covariates.
    /// Missing values are written as empty fields.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header: Vec<&str> = Vec::new();
        if self.is_panel() {
            header.push("series_id");
        }
        header.push("ds");
        header.extend(self.column_names());
        out.write_record(&header)?;

        let fmt = |v: f64| if v.is_nan() { String::new() } else { v.to_string() };
        for i in 0..self.len() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if let Some(id) = self.series_id(i) {
                record.push(id.to_string());
            }
            record.push(self.timestamps[i].to_rfc3339_opts(SecondsFormat::Secs, true));
            record.push(fmt(self.target[i]));
            record.extend(self.columns.iter().map(|c| fmt(c.values[i])));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }

    /// [`Frame::write_csv`] into a file.
    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }

    /// [`Frame::write_csv`] into a string.
    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| ForecastError::Data(e.to_string()))
    }
}
