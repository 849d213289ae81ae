//! Property-based tests for the rolling-origin splitter.
//!
//! Panels are generated with random series counts and lengths; the folds
//! must never let training rows reach into the test window.

use chrono::{DateTime, Duration, TimeZone, Utc};
use forecast_lab::core::Frame;
use forecast_lab::cv::RollingOriginSplitter;
use proptest::prelude::*;

fn day(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
}

/// Panel with one series per entry of `lengths`, all starting on the same day.
fn make_panel(lengths: &[usize]) -> Frame {
    let mut ids = Vec::new();
    let mut ts = Vec::new();
    let mut y = Vec::new();
    for (s, &n) in lengths.iter().enumerate() {
        for i in 0..n {
            ids.push(format!("s{s}"));
            ts.push(day(i));
            y.push((s * 1000 + i) as f64);
        }
    }
    Frame::new(Some(ids), ts, "y", y).unwrap()
}

fn rows_of(frame: &Frame, id: &str) -> Vec<DateTime<Utc>> {
    (0..frame.len())
        .filter(|&i| frame.series_id(i) == Some(id))
        .map(|i| frame.timestamps()[i])
        .collect()
}

fn lengths_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..120, 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn training_rows_precede_test_rows(
        lengths in lengths_strategy(),
        n_splits in 1usize..6,
        horizon in 1usize..15,
        min_train in 0usize..40,
    ) {
        let panel = make_panel(&lengths);
        let splitter = RollingOriginSplitter::new(n_splits, horizon)
            .unwrap()
            .with_min_train_points(min_train);

        for fold in splitter.split(&panel).unwrap() {
            for bounds in &fold.bounds {
                let id = bounds.series_id.as_deref().unwrap();
                let train = rows_of(&fold.train, id);
                let test = rows_of(&fold.test, id);
                prop_assert_eq!(test.len(), horizon);
                prop_assert!(train.len() >= min_train);
                let last_train = train.iter().max();
                let first_test = test.iter().min().unwrap();
                if let Some(last_train) = last_train {
                    prop_assert!(last_train < first_test);
                }
            }
        }
    }

    #[test]
    fn test_windows_move_forward(
        lengths in lengths_strategy(),
        n_splits in 2usize..6,
        horizon in 1usize..10,
        step in 1usize..10,
    ) {
        let panel = make_panel(&lengths);
        let splitter = RollingOriginSplitter::new(n_splits, horizon)
            .unwrap()
            .with_step_size(step)
            .unwrap();

        let folds: Vec<_> = splitter.split(&panel).unwrap().collect();
        for pair in folds.windows(2) {
            prop_assert!(pair[0].index < pair[1].index);
            for later in &pair[1].bounds {
                if let Some(earlier) = pair[0].bounds.iter().find(|b| b.series_id == later.series_id) {
                    prop_assert!(earlier.window.test_start < later.window.test_start);
                }
            }
        }
    }

    #[test]
    fn series_are_split_independently(
        lengths in lengths_strategy(),
        n_splits in 1usize..5,
        horizon in 1usize..10,
    ) {
        let panel = make_panel(&lengths);
        let splitter = RollingOriginSplitter::new(n_splits, horizon).unwrap();

        for fold in splitter.split(&panel).unwrap() {
            for bounds in &fold.bounds {
                let id = bounds.series_id.as_deref().unwrap();
                let s: usize = id[1..].parse().unwrap();
                // a series' bounds depend on its own length only
                prop_assert_eq!(Some(bounds.window), splitter.window(lengths[s], fold.index));
                let test_values: Vec<f64> = (0..fold.test.len())
                    .filter(|&i| fold.test.series_id(i) == Some(id))
                    .map(|i| fold.test.target()[i])
                    .collect();
                prop_assert!(test_values.iter().all(|v| (*v as usize) / 1000 == s));
            }
        }
    }

    #[test]
    fn short_series_yield_no_folds(
        n in 0usize..30,
        n_splits in 1usize..5,
        horizon in 1usize..10,
    ) {
        let panel = make_panel(&[n]);
        let splitter = RollingOriginSplitter::new(n_splits, horizon)
            .unwrap()
            .with_min_train_points(n);
        prop_assert_eq!(splitter.split(&panel).unwrap().count(), 0);
    }

    #[test]
    fn sliding_window_caps_training_size(
        n in 40usize..120,
        max_train in 1usize..30,
    ) {
        let panel = make_panel(&[n]);
        let splitter = RollingOriginSplitter::new(3, 5)
            .unwrap()
            .with_max_train_points(max_train)
            .unwrap();
        for fold in splitter.split(&panel).unwrap() {
            prop_assert!(fold.train.len() <= max_train);
            prop_assert_eq!(fold.bounds[0].window.train_end, fold.bounds[0].window.test_start);
        }
    }
}

#[test]
fn fold_sequence_can_be_replayed() {
    let panel = make_panel(&[60, 45]);
    let splitter = RollingOriginSplitter::new(3, 7).unwrap().with_min_train_points(20);
    let folds = splitter.split(&panel).unwrap();
    let first: Vec<_> = folds.clone().collect();
    let second: Vec<_> = folds.collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn unsorted_input_is_split_like_sorted_input() {
    let panel = make_panel(&[30, 30]);
    let reversed: Vec<usize> = (0..panel.len()).rev().collect();
    let shuffled = panel.take(&reversed);
    assert!(!shuffled.is_sorted());

    let splitter = RollingOriginSplitter::new(2, 5).unwrap();
    let a: Vec<_> = splitter.split(&panel).unwrap().collect();
    let b: Vec<_> = splitter.split(&shuffled).unwrap().collect();
    assert_eq!(a, b);
}
