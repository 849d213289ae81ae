//! Least-squares regression tree used as the boosting base learner.

/// Tree node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TreeNode {
    Leaf {
        value: f64,
    },
    /// Rows with a missing feature value follow the left branch.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeSettings {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree over column-major features.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    /// Fit on `target` restricted to `rows`, adding each split's gain to
    /// `importance[feature]`.
    pub fn fit(
        columns: &[Vec<f64>],
        target: &[f64],
        rows: &[usize],
        settings: TreeSettings,
        importance: &mut [f64],
    ) -> Self {
        let root = build_node(columns, target, rows, 0, settings, importance);
        Self { root }
    }

    /// Prediction for one row; `value(feature)` returns that row's feature.
    pub fn predict<F>(&self, value: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = value(*feature);
                    node = if x.is_nan() || x <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        count(&self.root)
    }
}

fn leaf(target: &[f64], rows: &[usize]) -> TreeNode {
    let value = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|&i| target[i]).sum::<f64>() / rows.len() as f64
    };
    TreeNode::Leaf { value }
}

fn build_node(
    columns: &[Vec<f64>],
    target: &[f64],
    rows: &[usize],
    depth: usize,
    settings: TreeSettings,
    importance: &mut [f64],
) -> TreeNode {
    if depth >= settings.max_depth || rows.len() < 2 * settings.min_samples_leaf {
        return leaf(target, rows);
    }
    let Some(split) = best_split(columns, target, rows, settings.min_samples_leaf) else {
        return leaf(target, rows);
    };

    let column = &columns[split.feature];
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&i| column[i].is_nan() || column[i] <= split.threshold);
    importance[split.feature] += split.gain;

    TreeNode::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(build_node(
            columns,
            target,
            &left_rows,
            depth + 1,
            settings,
            importance,
        )),
        right: Box::new(build_node(
            columns,
            target,
            &right_rows,
            depth + 1,
            settings,
            importance,
        )),
    }
}

/// Best variance-reducing split over all features.
///
/// Gain is `S_L²/n_L + S_R²/n_R - S²/n`, the drop in squared error.
fn best_split(
    columns: &[Vec<f64>],
    target: &[f64],
    rows: &[usize],
    min_leaf: usize,
) -> Option<Split> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| target[i]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<Split> = None;

    for (feature, column) in columns.iter().enumerate() {
        let mut missing_sum = 0.0;
        let mut missing_count = 0usize;
        let mut present: Vec<(f64, f64)> = Vec::with_capacity(n);
        for &i in rows {
            if column[i].is_nan() {
                missing_sum += target[i];
                missing_count += 1;
            } else {
                present.push((column[i], target[i]));
            }
        }
        present.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = missing_sum;
        for k in 0..present.len().saturating_sub(1) {
            left_sum += present[k].1;
            let (lo, hi) = (present[k].0, present[k + 1].0);
            if lo == hi {
                continue;
            }
            let left_count = missing_count + k + 1;
            let right_count = n - left_count;
            if left_count < min_leaf || right_count < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_count as f64
                + right_sum * right_sum / right_count as f64
                - parent_score;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                let mid = lo + (hi - lo) / 2.0;
                best = Some(Split {
                    feature,
                    threshold: if mid < hi { mid } else { lo },
                    gain,
                });
            }
        }
    }
    best
}
