//! CSV dataset loaders.
//!
//! Every loader returns a long-format [`Frame`] sorted by
//! `(series_id, timestamp)`. The OPSD and M5 loaders convert the raw wide
//! files once and cache the long result next to them.

use super::DatasetConfig;
use crate::core::{parse_timestamp, Frame};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const OPSD_CACHE: &str = "opsd_long.csv";
const OPSD_RAW: &str = "opsd_time_series.csv";
const M5_CACHE: &str = "m5_long.csv";
const M5_SALES: &str = "sales_train_validation.csv";
const M5_CALENDAR: &str = "calendar.csv";

/// Column layout of a long CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSchema {
    /// Series id column; a file without it is read as one series.
    pub id_col: Option<String>,
    pub ts_col: String,
    pub target: String,
    /// Keep the last row of repeated `(series_id, timestamp)` keys instead
    /// of failing.
    pub dedup_last: bool,
}

impl Default for CsvSchema {
    fn default() -> Self {
        Self {
            id_col: Some("series_id".to_string()),
            ts_col: "ds".to_string(),
            target: "y".to_string(),
            dedup_last: false,
        }
    }
}

fn parse_value(raw: &str, line: usize, column: &str) -> Result<f64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    s.parse::<f64>().map_err(|_| {
        ForecastError::Data(format!("line {line}: unparsable value '{raw}' in column '{column}'"))
    })
}

fn is_numeric(raw: &str) -> bool {
    let s = raw.trim();
    s.is_empty() || s.eq_ignore_ascii_case("nan") || s.parse::<f64>().is_ok()
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| ForecastError::missing_column(name))
}

fn not_found(what: &str, path: &Path) -> ForecastError {
    ForecastError::Io(format!("{what} not found at {}", path.display()))
}

/// Load a long-format CSV file.
///
/// Numeric columns besides the id, timestamp and target become covariates;
/// columns holding any non-numeric value are ignored. Empty fields are
/// missing values.
pub fn load_long_csv(path: impl AsRef<Path>, schema: &CsvSchema) -> Result<Frame> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let records: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
    if records.is_empty() {
        return Err(ForecastError::EmptyData);
    }

    let ts_idx = column_index(&headers, &schema.ts_col)?;
    let target_idx = column_index(&headers, &schema.target)?;
    let id_idx = schema
        .id_col
        .as_deref()
        .and_then(|name| headers.iter().position(|h| h == name));

    let covariates: Vec<usize> = (0..headers.len())
        .filter(|&i| i != ts_idx && i != target_idx && Some(i) != id_idx)
        .filter(|&i| records.iter().all(|r| r.get(i).map_or(true, is_numeric)))
        .collect();
    let ignored = headers.len() - covariates.len() - 2 - usize::from(id_idx.is_some());
    if ignored > 0 {
        debug!(file = %path.display(), ignored, "skipping non-numeric columns");
    }

    let mut timestamps = Vec::with_capacity(records.len());
    let mut target = Vec::with_capacity(records.len());
    let mut ids = id_idx.map(|_| Vec::with_capacity(records.len()));
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); covariates.len()];
    for (row, record) in records.iter().enumerate() {
        // header is line 1
        let line = row + 2;
        let field = |i: usize| record.get(i).unwrap_or("");
        timestamps.push(
            parse_timestamp(field(ts_idx))
                .map_err(|e| ForecastError::Data(format!("line {line}: {e}")))?,
        );
        target.push(parse_value(field(target_idx), line, &schema.target)?);
        if let (Some(ids), Some(idx)) = (ids.as_mut(), id_idx) {
            ids.push(field(idx).to_string());
        }
        for (values, &idx) in columns.iter_mut().zip(&covariates) {
            values.push(parse_value(field(idx), line, &headers[idx])?);
        }
    }

    let mut frame = Frame::new(ids, timestamps, schema.target.clone(), target)?;
    for (values, &idx) in columns.into_iter().zip(&covariates) {
        frame.add_column(&headers[idx], values)?;
    }
    if schema.dedup_last {
        frame = frame.dedup_last();
    }
    let frame = frame.sorted()?;
    info!(file = %path.display(), rows = frame.len(), "loaded long csv");
    Ok(frame)
}

fn write_cache(frame: &Frame, path: &Path) -> Result<()> {
    frame.write_csv_file(path)?;
    info!(file = %path.display(), rows = frame.len(), "wrote long-format cache");
    Ok(())
}

/// Load the Open Power System Data load series.
///
/// Reads `opsd_long.csv` when present; otherwise converts the raw wide
/// `opsd_time_series.csv` (every `*load_actual*` column is a series, empty
/// cells dropped) and writes the cache.
pub fn load_opsd(dir: impl AsRef<Path>) -> Result<Frame> {
    let dir = dir.as_ref();
    let cache = dir.join(OPSD_CACHE);
    if cache.exists() {
        return load_long_csv(&cache, &CsvSchema::default());
    }
    let raw = dir.join(OPSD_RAW);
    if !raw.exists() {
        return Err(not_found("OPSD data", dir));
    }

    let mut reader = csv::Reader::from_path(&raw)?;
    let headers = reader.headers()?.clone();
    let ts_idx = column_index(&headers, "utc_timestamp")?;
    let load_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.to_lowercase().contains("load_actual"))
        .map(|(i, _)| i)
        .collect();
    if load_cols.is_empty() {
        return Err(ForecastError::Data(format!(
            "no load columns found in {}",
            raw.display()
        )));
    }

    let mut ids = Vec::new();
    let mut timestamps = Vec::new();
    let mut target = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let ts = parse_timestamp(record.get(ts_idx).unwrap_or(""))
            .map_err(|e| ForecastError::Data(format!("line {line}: {e}")))?;
        for &idx in &load_cols {
            let value = parse_value(record.get(idx).unwrap_or(""), line, &headers[idx])?;
            if value.is_nan() {
                continue;
            }
            ids.push(headers[idx].to_string());
            timestamps.push(ts);
            target.push(value);
        }
    }
    if target.is_empty() {
        return Err(ForecastError::EmptyData);
    }

    let frame = Frame::new(Some(ids), timestamps, "y", target)?.sorted()?;
    write_cache(&frame, &cache)?;
    Ok(frame)
}

fn load_m5_calendar(path: &Path) -> Result<HashMap<String, DateTime<Utc>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let d_idx = column_index(&headers, "d")?;
    let date_idx = column_index(&headers, "date")?;
    let mut days = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let d = record.get(d_idx).unwrap_or("").to_string();
        days.insert(d, parse_timestamp(record.get(date_idx).unwrap_or(""))?);
    }
    Ok(days)
}

/// Load the M5 retail sales panel.
///
/// Reads `m5_long.csv` when present; otherwise melts the raw
/// `sales_train_validation.csv` with dates from `calendar.csv` and writes
/// the cache. Series ids are `state_store_dept_item`, the state being the
/// first two characters of the store id.
pub fn load_m5(dir: impl AsRef<Path>) -> Result<Frame> {
    let dir = dir.as_ref();
    let cache = dir.join(M5_CACHE);
    if cache.exists() {
        return load_long_csv(&cache, &CsvSchema::default());
    }
    let sales_path = dir.join(M5_SALES);
    if !sales_path.exists() {
        return Err(not_found("M5 data", dir));
    }
    let calendar_path = dir.join(M5_CALENDAR);
    if !calendar_path.exists() {
        return Err(not_found("M5 calendar", dir));
    }
    let calendar = load_m5_calendar(&calendar_path)?;

    let mut reader = csv::Reader::from_path(&sales_path)?;
    let headers = reader.headers()?.clone();
    let item_idx = column_index(&headers, "item_id")?;
    let dept_idx = column_index(&headers, "dept_id")?;
    let store_idx = column_index(&headers, "store_id")?;
    let day_cols: Vec<(usize, DateTime<Utc>)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("d_"))
        .map(|(i, h)| {
            calendar
                .get(h)
                .map(|ts| (i, *ts))
                .ok_or_else(|| ForecastError::Data(format!("day '{h}' missing from calendar")))
        })
        .collect::<Result<_>>()?;

    let mut ids = Vec::new();
    let mut timestamps = Vec::new();
    let mut target = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let store = record.get(store_idx).unwrap_or("");
        let state: String = store.chars().take(2).collect();
        let series_id = format!(
            "{}_{}_{}_{}",
            state,
            store,
            record.get(dept_idx).unwrap_or(""),
            record.get(item_idx).unwrap_or("")
        );
        for &(idx, ts) in &day_cols {
            ids.push(series_id.clone());
            timestamps.push(ts);
            target.push(parse_value(record.get(idx).unwrap_or(""), line, &headers[idx])?);
        }
    }
    if target.is_empty() {
        return Err(ForecastError::EmptyData);
    }

    let frame = Frame::new(Some(ids), timestamps, "y", target)?.sorted()?;
    write_cache(&frame, &cache)?;
    Ok(frame)
}

fn resolve(config_path: &Path, data_path: &str) -> PathBuf {
    let data_path = Path::new(data_path);
    if data_path.is_absolute() {
        return data_path.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(data_path))
        .unwrap_or_else(|| data_path.to_path_buf())
}

/// Load the dataset named in the configuration.
///
/// Relative paths are resolved against the directory of `config_path`.
pub fn load_dataset(config_path: impl AsRef<Path>, config: &DatasetConfig) -> Result<Frame> {
    let path = resolve(config_path.as_ref(), &config.path);
    let name = config.name.to_lowercase();
    info!(dataset = %config.name, path = %path.display(), "loading dataset");
    if name.contains("m5") || name.contains("retail") {
        load_m5(&path)
    } else if name.contains("opsd") || name.contains("energy") {
        load_opsd(&path)
    } else {
        load_long_csv(&path, &config.schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn long_csv_keeps_numeric_covariates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "series_id,ds,y,price,store_name\n\
             b,2024-01-01,5,1.5,north\n\
             a,2024-01-02,2,,south\n\
             a,2024-01-01,1,2.0,south\n",
        )
        .unwrap();
        let frame = load_long_csv(&path, &CsvSchema::default()).unwrap();
        assert_eq!(frame.feature_names(), vec!["price"]);
        assert_eq!(frame.series_id(0), Some("a"));
        assert_eq!(frame.timestamps()[0], day(1));
        assert_eq!(frame.target(), &[1.0, 2.0, 5.0][..]);
        assert!(frame.column("price").unwrap()[1].is_nan());
    }

    #[test]
    fn long_csv_without_id_column_is_one_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.csv");
        fs::write(&path, "ds,y\n2024-01-02 00:00:00,2\n2024-01-01 00:00:00,1\n").unwrap();
        let frame = load_long_csv(&path, &CsvSchema::default()).unwrap();
        assert!(!frame.is_panel());
        assert_eq!(frame.target(), &[1.0, 2.0][..]);
    }

    #[test]
    fn duplicates_fail_unless_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dups.csv");
        fs::write(&path, "series_id,ds,y\na,2024-01-01,1\na,2024-01-01,3\n").unwrap();
        let err = load_long_csv(&path, &CsvSchema::default()).unwrap_err();
        assert!(err.is_data());

        let schema = CsvSchema {
            dedup_last: true,
            ..CsvSchema::default()
        };
        let frame = load_long_csv(&path, &schema).unwrap();
        assert_eq!(frame.target(), &[3.0][..]);
    }

    #[test]
    fn bad_values_and_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "series_id,ds,y\na,2024-01-01,oops\n").unwrap();
        assert!(load_long_csv(&path, &CsvSchema::default()).unwrap_err().is_data());

        let schema = CsvSchema {
            target: "sales".to_string(),
            ..CsvSchema::default()
        };
        assert!(load_long_csv(&path, &schema).unwrap_err().is_configuration());
        assert!(matches!(
            load_long_csv(dir.path().join("absent.csv"), &CsvSchema::default()),
            Err(ForecastError::Io(_))
        ));
    }

    #[test]
    fn opsd_converts_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(OPSD_RAW),
            "utc_timestamp,DE_load_actual_entsoe_transparency,DE_solar_generation,FR_load_actual_entsoe_transparency\n\
             2024-01-01T00:00:00Z,100,5,80\n\
             2024-01-01T01:00:00Z,,6,82\n\
             2024-01-01T02:00:00Z,104,7,\n",
        )
        .unwrap();
        let frame = load_opsd(dir.path()).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.series_id(0), Some("DE_load_actual_entsoe_transparency"));
        assert_eq!(frame.target(), &[100.0, 104.0, 80.0, 82.0][..]);
        assert!(dir.path().join(OPSD_CACHE).exists());

        fs::remove_file(dir.path().join(OPSD_RAW)).unwrap();
        let cached = load_opsd(dir.path()).unwrap();
        assert_eq!(cached.target(), frame.target());
        assert_eq!(cached.timestamps(), frame.timestamps());
    }

    #[test]
    fn opsd_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_opsd(dir.path()), Err(ForecastError::Io(_))));
        fs::write(dir.path().join(OPSD_RAW), "utc_timestamp,price\n2024-01-01,3\n").unwrap();
        assert!(load_opsd(dir.path()).unwrap_err().is_data());
    }

    #[test]
    fn m5_melts_sales_with_calendar() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(M5_CALENDAR),
            "date,wm_yr_wk,d\n2024-01-01,1,d_1\n2024-01-02,1,d_2\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(M5_SALES),
            "id,item_id,dept_id,cat_id,store_id,state_id,d_1,d_2\n\
             x,FOODS_1_001,FOODS_1,FOODS,CA_1,CA,3,0\n",
        )
        .unwrap();
        let frame = load_m5(dir.path()).unwrap();
        assert_eq!(frame.series_id(0), Some("CA_CA_1_FOODS_1_FOODS_1_001"));
        assert_eq!(frame.timestamps(), &[day(1), day(2)][..]);
        assert_eq!(frame.target(), &[3.0, 0.0][..]);
        assert!(dir.path().join(M5_CACHE).exists());
    }

    #[test]
    fn dataset_paths_resolve_against_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/sales.csv"), "series_id,ds,y\na,2024-01-01,1\n").unwrap();
        let config_path = dir.path().join("experiment.yaml");
        let config = DatasetConfig::new("shop", "data/sales.csv");
        let frame = load_dataset(&config_path, &config).unwrap();
        assert_eq!(frame.len(), 1);
    }
}
