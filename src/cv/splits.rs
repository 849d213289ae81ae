//! Rolling-origin cross-validation for single series and panels.
//!
//! For fold `i` of `n_splits` and a series with `n` rows:
//!
//! ```text
//! test_end   = n - (n_splits - i - 1) * step_size
//! test_start = test_end - horizon
//! train_end  = test_start
//! ```
//!
//! A series takes part in fold `i` only when `train_end >= min_train_points`.
//! A fold index in which no series takes part is skipped. Folds come out
//! lazily in increasing `i`, so later folds have later test windows.

use crate::core::{Frame, SeriesRange};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

/// Splitting method named in configuration. Both select the rolling-origin
/// splitter, whose training window grows from the series start unless
/// `max_train_points` caps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CvMethod {
    #[default]
    Rolling,
    Expanding,
}

/// Cross-validation recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvConfig {
    #[serde(default)]
    pub method: CvMethod,
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_min_train_points")]
    pub min_train_points: usize,
    /// Distance between consecutive fold origins; defaults to `horizon`.
    #[serde(default)]
    pub step_size: Option<usize>,
    /// Keep only the most recent rows of each training part.
    #[serde(default)]
    pub max_train_points: Option<usize>,
}

fn default_n_splits() -> usize {
    4
}

fn default_horizon() -> usize {
    28
}

fn default_min_train_points() -> usize {
    365
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            method: CvMethod::default(),
            n_splits: default_n_splits(),
            horizon: default_horizon(),
            min_train_points: default_min_train_points(),
            step_size: None,
            max_train_points: None,
        }
    }
}

/// Row positions of one series' fold, local to that series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Bounds of one participating series within a fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesBounds {
    pub series_id: Option<String>,
    pub window: WindowBounds,
}

/// One train/test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// Fold index in `0..n_splits`; skipped indices leave gaps.
    pub index: usize,
    /// Participating series in id order.
    pub bounds: Vec<SeriesBounds>,
    /// Training rows, series by series.
    pub train: Frame,
    /// Test rows, series by series.
    pub test: Frame,
}

impl Fold {
    pub fn n_series(&self) -> usize {
        self.bounds.len()
    }

    pub fn series_ids(&self) -> Vec<Option<&str>> {
        self.bounds.iter().map(|b| b.series_id.as_deref()).collect()
    }
}

/// Rolling-origin splitter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingOriginSplitter {
    n_splits: usize,
    horizon: usize,
    min_train_points: usize,
    step_size: usize,
    max_train_points: Option<usize>,
}

impl RollingOriginSplitter {
    /// Splitter with `step_size = horizon` and no minimum training size.
    pub fn new(n_splits: usize, horizon: usize) -> Result<Self> {
        if n_splits == 0 {
            return Err(ForecastError::Configuration(
                "n_splits must be at least 1".to_string(),
            ));
        }
        if horizon == 0 {
            return Err(ForecastError::Configuration(
                "horizon must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            n_splits,
            horizon,
            min_train_points: 0,
            step_size: horizon,
            max_train_points: None,
        })
    }

    pub fn from_config(config: &CvConfig) -> Result<Self> {
        let mut splitter = Self::new(config.n_splits, config.horizon)?
            .with_min_train_points(config.min_train_points);
        if let Some(step) = config.step_size {
            splitter = splitter.with_step_size(step)?;
        }
        if let Some(max) = config.max_train_points {
            splitter = splitter.with_max_train_points(max)?;
        }
        Ok(splitter)
    }

    pub fn with_min_train_points(mut self, min_train_points: usize) -> Self {
        self.min_train_points = min_train_points;
        self
    }

    pub fn with_step_size(mut self, step_size: usize) -> Result<Self> {
        if step_size == 0 {
            return Err(ForecastError::Configuration(
                "step_size must be at least 1".to_string(),
            ));
        }
        self.step_size = step_size;
        Ok(self)
    }

    pub fn with_max_train_points(mut self, max_train_points: usize) -> Result<Self> {
        if max_train_points == 0 {
            return Err(ForecastError::Configuration(
                "max_train_points must be at least 1".to_string(),
            ));
        }
        self.max_train_points = Some(max_train_points);
        Ok(self)
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn min_train_points(&self) -> usize {
        self.min_train_points
    }

    pub fn step_size(&self) -> usize {
        self.step_size
    }

    /// Bounds of fold `index` for a series of `n` rows, or `None` when the
    /// series does not take part in that fold.
    pub fn window(&self, n: usize, index: usize) -> Option<WindowBounds> {
        if index >= self.n_splits {
            return None;
        }
        let back = (self.n_splits - index - 1).checked_mul(self.step_size)?;
        let test_end = n.checked_sub(back)?;
        let test_start = test_end.checked_sub(self.horizon)?;
        let train_end = test_start;
        if train_end < self.min_train_points {
            return None;
        }
        let train_start = self
            .max_train_points
            .map_or(0, |max| train_end.saturating_sub(max));
        Some(WindowBounds {
            train_start,
            train_end,
            test_start,
            test_end,
        })
    }

    /// Lazy fold sequence over `frame`.
    ///
    /// An unsorted frame is sorted into a private copy; duplicate
    /// timestamps within a series are a data error. Running out of data is
    /// not an error: the sequence may be empty.
    pub fn split<'a>(&self, frame: &'a Frame) -> Result<Folds<'a>> {
        let frame = if frame.is_sorted() {
            Cow::Borrowed(frame)
        } else {
            Cow::Owned(frame.sorted()?)
        };
        let ranges = frame.series_ranges();
        Ok(Folds {
            frame,
            ranges,
            splitter: *self,
            next_index: 0,
        })
    }
}

/// Iterator over the folds of one frame. Cloning restarts from the same
/// position, so the sequence can be replayed.
#[derive(Debug, Clone)]
pub struct Folds<'a> {
    frame: Cow<'a, Frame>,
    ranges: Vec<SeriesRange>,
    splitter: RollingOriginSplitter,
    next_index: usize,
}

impl Folds<'_> {
    /// The time-sorted frame the folds are cut from.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    fn build(&self, index: usize) -> Option<Fold> {
        let mut bounds = Vec::new();
        let mut train_rows = Vec::new();
        let mut test_rows = Vec::new();
        for range in &self.ranges {
            let Some(window) = self.splitter.window(range.len(), index) else {
                continue;
            };
            let offset = range.rows.start;
            train_rows.extend(offset + window.train_start..offset + window.train_end);
            test_rows.extend(offset + window.test_start..offset + window.test_end);
            bounds.push(SeriesBounds {
                series_id: range.id.clone(),
                window,
            });
        }
        if bounds.is_empty() {
            return None;
        }
        Some(Fold {
            index,
            bounds,
            train: self.frame.take(&train_rows),
            test: self.frame.take(&test_rows),
        })
    }
}

impl Iterator for Folds<'_> {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        while self.next_index < self.splitter.n_splits {
            let index = self.next_index;
            self.next_index += 1;
            match self.build(index) {
                Some(fold) => return Some(fold),
                None => debug!(fold = index, "skipping fold without enough training data"),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.splitter.n_splits - self.next_index))
    }
}

/// Holdout split: the last `test_size` rows of every series form the test
/// part. Series no longer than `test_size` go entirely to the test part.
pub fn train_test_split(frame: &Frame, test_size: usize) -> Result<(Frame, Frame)> {
    if test_size == 0 {
        return Err(ForecastError::Configuration(
            "test_size must be at least 1".to_string(),
        ));
    }
    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for rows in frame.series_row_groups()? {
        let cut = rows.len().saturating_sub(test_size);
        train_rows.extend_from_slice(&rows[..cut]);
        test_rows.extend_from_slice(&rows[cut..]);
    }
    Ok((frame.take(&train_rows), frame.take(&test_rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
    }

    fn single(n: usize) -> Frame {
        Frame::new(None, (0..n).map(day).collect(), "y", (0..n).map(|i| i as f64).collect())
            .unwrap()
    }

    fn panel(lengths: &[(&str, usize)]) -> Frame {
        let mut ids = Vec::new();
        let mut ts = Vec::new();
        let mut y = Vec::new();
        for (id, n) in lengths {
            for i in 0..*n {
                ids.push(id.to_string());
                ts.push(day(i));
                y.push(i as f64);
            }
        }
        Frame::new(Some(ids), ts, "y", y).unwrap()
    }

    #[test]
    fn single_series_windows() {
        let splitter = RollingOriginSplitter::new(3, 5).unwrap().with_min_train_points(10);
        let folds: Vec<Fold> = splitter.split(&single(40)).unwrap().collect();
        assert_eq!(folds.len(), 3);
        let windows: Vec<WindowBounds> = folds.iter().map(|f| f.bounds[0].window).collect();
        assert_eq!(
            windows[0],
            WindowBounds {
                train_start: 0,
                train_end: 25,
                test_start: 25,
                test_end: 30
            }
        );
        assert_eq!(windows[2].test_end, 40);
        for fold in &folds {
            assert_eq!(fold.test.len(), 5);
            let last_train = fold.train.timestamps().iter().max().unwrap();
            let first_test = fold.test.timestamps().iter().min().unwrap();
            assert!(last_train < first_test);
        }
    }

    #[test]
    fn step_size_controls_origin_spacing() {
        let splitter = RollingOriginSplitter::new(3, 7)
            .unwrap()
            .with_step_size(1)
            .unwrap();
        let starts: Vec<usize> = splitter
            .split(&single(30))
            .unwrap()
            .map(|f| f.bounds[0].window.test_start)
            .collect();
        assert_eq!(starts, vec![21, 22, 23]);
    }

    #[test]
    fn early_folds_are_skipped_for_short_history() {
        let splitter = RollingOriginSplitter::new(4, 5).unwrap().with_min_train_points(12);
        let folds: Vec<Fold> = splitter.split(&single(30)).unwrap().collect();
        // train_end per fold: 10, 15, 20, 25
        let indices: Vec<usize> = folds.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn degenerate_inputs_yield_no_folds() {
        let splitter = RollingOriginSplitter::new(3, 10).unwrap().with_min_train_points(100);
        assert_eq!(splitter.split(&single(50)).unwrap().count(), 0);

        let splitter = RollingOriginSplitter::new(10, 10).unwrap();
        // test windows before the series start are skipped, not errors
        let folds: Vec<Fold> = splitter.split(&single(25)).unwrap().collect();
        assert_eq!(folds.iter().map(|f| f.index).collect::<Vec<_>>(), vec![8, 9]);

        let empty = Frame::new(None, vec![], "y", vec![]).unwrap();
        assert_eq!(splitter.split(&empty).unwrap().count(), 0);
    }

    #[test]
    fn zero_parameters_are_configuration_errors() {
        assert!(RollingOriginSplitter::new(0, 5).unwrap_err().is_configuration());
        assert!(RollingOriginSplitter::new(2, 0).unwrap_err().is_configuration());
        let splitter = RollingOriginSplitter::new(2, 5).unwrap();
        assert!(splitter.with_step_size(0).unwrap_err().is_configuration());
    }

    #[test]
    fn short_series_drops_out_of_panel_folds() {
        let frame = panel(&[("long", 40), ("short", 12)]);
        let splitter = RollingOriginSplitter::new(2, 5).unwrap().with_min_train_points(10);
        let folds: Vec<Fold> = splitter.split(&frame).unwrap().collect();
        assert_eq!(folds.len(), 2);
        // short: fold 0 train_end = 2, fold 1 train_end = 7, both below 10
        for fold in &folds {
            assert_eq!(fold.series_ids(), vec![Some("long")]);
            assert!(fold
                .train
                .series_ids()
                .unwrap()
                .iter()
                .all(|id| id == "long"));
            assert_eq!(fold.test.len(), 5);
        }
    }

    #[test]
    fn panel_series_use_their_own_length() {
        let frame = panel(&[("a", 30), ("b", 20)]);
        let splitter = RollingOriginSplitter::new(2, 4).unwrap().with_min_train_points(5);
        let folds: Vec<Fold> = splitter.split(&frame).unwrap().collect();
        assert_eq!(folds.len(), 2);
        let last = &folds[1];
        assert_eq!(last.n_series(), 2);
        assert_eq!(last.bounds[0].window.test_end, 30);
        assert_eq!(last.bounds[1].window.test_end, 20);
        assert_eq!(last.train.len(), 26 + 16);
        assert_eq!(last.test.len(), 8);
        // train parts come first for a, then b
        assert_eq!(last.train.series_id(0), Some("a"));
        assert_eq!(last.train.series_id(26), Some("b"));
    }

    #[test]
    fn unsorted_input_is_not_mutated() {
        let sorted = panel(&[("a", 15), ("b", 15)]);
        let mut reversed_rows: Vec<usize> = (0..sorted.len()).collect();
        reversed_rows.reverse();
        let shuffled = sorted.take(&reversed_rows);
        let before = shuffled.clone();

        let splitter = RollingOriginSplitter::new(2, 3).unwrap();
        let from_sorted: Vec<Fold> = splitter.split(&sorted).unwrap().collect();
        let from_shuffled: Vec<Fold> = splitter.split(&shuffled).unwrap().collect();
        assert_eq!(from_sorted, from_shuffled);
        assert_eq!(shuffled, before);
    }

    #[test]
    fn folds_are_replayable() {
        let frame = single(30);
        let splitter = RollingOriginSplitter::new(3, 5).unwrap();
        let folds = splitter.split(&frame).unwrap();
        let first: Vec<usize> = folds.clone().map(|f| f.index).collect();
        let second: Vec<usize> = folds.map(|f| f.index).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_timestamps_fail() {
        let frame = Frame::new(None, vec![day(1), day(0), day(1)], "y", vec![1.0; 3]).unwrap();
        let splitter = RollingOriginSplitter::new(1, 1).unwrap();
        assert!(splitter.split(&frame).unwrap_err().is_data());
    }

    #[test]
    fn max_train_points_slides_the_window() {
        let splitter = RollingOriginSplitter::new(2, 5)
            .unwrap()
            .with_max_train_points(8)
            .unwrap();
        let folds: Vec<Fold> = splitter.split(&single(30)).unwrap().collect();
        assert_eq!(folds[0].train.len(), 8);
        assert_eq!(folds[0].bounds[0].window.train_start, 12);
    }

    #[test]
    fn holdout_split_takes_series_tails() {
        let frame = panel(&[("a", 10), ("b", 3)]);
        let (train, test) = train_test_split(&frame, 4).unwrap();
        assert_eq!(train.len(), 6);
        assert_eq!(test.len(), 4 + 3);
        assert_eq!(test.target()[0], 6.0);
        assert!(train_test_split(&frame, 0).is_err());
    }

    #[test]
    fn config_defaults_and_parsing() {
        let config: CvConfig = serde_yaml::from_str("n_splits: 3\nstep_size: 7").unwrap();
        assert_eq!(config.horizon, 28);
        assert_eq!(config.min_train_points, 365);
        assert_eq!(config.method, CvMethod::Rolling);
        let splitter = RollingOriginSplitter::from_config(&config).unwrap();
        assert_eq!(splitter.step_size(), 7);
        assert!(serde_yaml::from_str::<CvConfig>("method: kfold").is_err());
    }
}
