//! Gradient-boosted regression trees with additive feature attribution.
//!
//! Features are the fixed set of monthly deltas; the target is the
//! next-month equity return. The boosting loop is plain least-squares
//! gradient boosting: each depth-limited tree fits the current residuals on
//! a seeded row/column subsample and is added with the learning rate.
//!
//! Attribution walks each tree's decision path and credits the split
//! feature with the change in subtree expectation at every step, so the
//! per-feature contributions plus the model baseline reconstruct the
//! prediction exactly (the conservation property) regardless of the order
//! trees or features are visited in.
//!
//! Evaluation uses a chronological holdout of the last `test_size` months;
//! shuffling time-series rows into random folds would leak the future into
//! the training sample.

use chrono::NaiveDate;
use rand::prelude::*;
use rand::seq::index::sample as index_sample;
use serde::{Deserialize, Serialize};

use crate::config::{BOOST_FEATURES, RunConfig};
use crate::error::AppError;
use crate::panel::MonthlyPanel;

/// One node of a fitted tree; `feature == None` marks a leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: Option<usize>,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Mean residual of the training rows that reached this node; interior
    /// nodes keep it for path attribution.
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            match node.feature {
                None => return node.value,
                Some(f) => {
                    idx = if row[f] <= node.threshold { node.left } else { node.right };
                }
            }
        }
    }

    /// Accumulate per-feature contributions for one row: at every split the
    /// chosen feature is credited with the change in subtree expectation.
    /// The increments along the path telescope to `leaf − root`.
    pub fn contributions(&self, row: &[f64], out: &mut [f64]) {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            let Some(f) = node.feature else { return };
            let next = if row[f] <= node.threshold { node.left } else { node.right };
            out[f] += self.nodes[next].value - node.value;
            idx = next;
        }
    }

    /// Expected output before any split.
    pub fn root_value(&self) -> f64 {
        self.nodes[0].value
    }
}

/// Fitted ensemble, persisted to `results/models/boost.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostArtifact {
    pub feature_names: Vec<String>,
    pub target: String,
    /// Expected model output: F0 plus the learning-rate-weighted root
    /// values. Contributions sum to `prediction − baseline`.
    pub baseline: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
    pub train_rmse: f64,
    pub test_rmse: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    /// Mean |contribution| per feature over all usable rows, descending.
    pub importance: Vec<(String, f64)>,
}

impl BoostArtifact {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut out = self.baseline - self.shift();
        for tree in &self.trees {
            out += self.learning_rate * tree.predict(row);
        }
        out
    }

    /// Per-feature contributions for one row; they sum to
    /// `predict(row) − baseline` up to floating-point rounding.
    pub fn contributions(&self, row: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.feature_names.len()];
        let mut scaled = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            scaled.iter_mut().for_each(|v| *v = 0.0);
            tree.contributions(row, &mut scaled);
            for (acc, v) in out.iter_mut().zip(&scaled) {
                *acc += self.learning_rate * v;
            }
        }
        out
    }

    /// Learning-rate-weighted sum of root values (the part of the baseline
    /// contributed by the trees themselves).
    fn shift(&self) -> f64 {
        self.learning_rate * self.trees.iter().map(Tree::root_value).sum::<f64>()
    }
}

/// A usable row: month, feature vector, target.
pub struct BoostSample {
    pub months: Vec<NaiveDate>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

pub struct BoostOutcome {
    pub artifact: Option<BoostArtifact>,
    pub sample: BoostSample,
    pub notes: Vec<String>,
}

/// Assemble rows, fit the ensemble, and evaluate on the holdout.
pub fn estimate(panel: &MonthlyPanel, config: &RunConfig) -> Result<BoostOutcome, AppError> {
    let target_name = "ret_sp500";
    let sample = collect_rows(panel, target_name)?;
    let n = sample.target.len();

    let min_rows = config.boost.test_size + 30;
    if n < min_rows {
        return Ok(BoostOutcome {
            artifact: None,
            sample,
            notes: vec![format!(
                "Only {n} usable rows; need at least {min_rows} for training plus the holdout. Model skipped."
            )],
        });
    }

    let n_train = n - config.boost.test_size;
    let params = &config.boost;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let f0 = sample.target[..n_train].iter().sum::<f64>() / n_train as f64;
    let mut fitted: Vec<f64> = vec![f0; n_train];
    let mut trees = Vec::with_capacity(params.n_trees);
    let n_features = BOOST_FEATURES.len();

    for _ in 0..params.n_trees {
        let residuals: Vec<f64> = (0..n_train)
            .map(|i| sample.target[i] - fitted[i])
            .collect();

        let n_rows = ((n_train as f64 * params.subsample).round() as usize).clamp(1, n_train);
        let mut rows: Vec<usize> = index_sample(&mut rng, n_train, n_rows).into_vec();
        rows.sort_unstable();

        let n_cols = ((n_features as f64 * params.colsample).round() as usize).clamp(1, n_features);
        let mut cols: Vec<usize> = index_sample(&mut rng, n_features, n_cols).into_vec();
        cols.sort_unstable();

        let tree = grow_tree(&sample.features, &residuals, &rows, &cols, params.max_depth, params.min_leaf);
        for i in 0..n_train {
            fitted[i] += params.learning_rate * tree.predict(&sample.features[i]);
        }
        trees.push(tree);
    }

    let baseline = f0 + params.learning_rate * trees.iter().map(Tree::root_value).sum::<f64>();

    let mut artifact = BoostArtifact {
        feature_names: BOOST_FEATURES.iter().map(|s| s.to_string()).collect(),
        target: target_name.to_string(),
        baseline,
        learning_rate: params.learning_rate,
        trees,
        train_rmse: 0.0,
        test_rmse: None,
        n_train,
        n_test: n - n_train,
        importance: Vec::new(),
    };

    artifact.train_rmse = rmse(&artifact, &sample, 0, n_train);
    artifact.test_rmse = Some(rmse(&artifact, &sample, n_train, n));

    // Global importance: mean |contribution| across every usable row.
    let mut totals = vec![0.0f64; n_features];
    for row in &sample.features {
        for (t, c) in totals.iter_mut().zip(artifact.contributions(row)) {
            *t += c.abs();
        }
    }
    let mut importance: Vec<(String, f64)> = artifact
        .feature_names
        .iter()
        .cloned()
        .zip(totals.iter().map(|t| t / n as f64))
        .collect();
    importance.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    artifact.importance = importance;

    Ok(BoostOutcome {
        artifact: Some(artifact),
        sample,
        notes: Vec::new(),
    })
}

/// Rows where every feature and the next-month target are present.
fn collect_rows(panel: &MonthlyPanel, target_name: &str) -> Result<BoostSample, AppError> {
    let target_col = panel.require_column(target_name)?;
    let feature_cols: Vec<&[f64]> = BOOST_FEATURES
        .iter()
        .map(|name| panel.require_column(name))
        .collect::<Result<_, _>>()?;

    let n = panel.n_rows();
    let mut months = Vec::new();
    let mut features = Vec::new();
    let mut target = Vec::new();
    for t in 0..n.saturating_sub(1) {
        let next_ret = target_col[t + 1];
        if !next_ret.is_finite() {
            continue;
        }
        let row: Vec<f64> = feature_cols.iter().map(|c| c[t]).collect();
        if row.iter().any(|v| !v.is_finite()) {
            continue;
        }
        months.push(panel.months()[t]);
        features.push(row);
        target.push(next_ret);
    }

    Ok(BoostSample {
        months,
        features,
        target,
    })
}

fn rmse(artifact: &BoostArtifact, sample: &BoostSample, from: usize, to: usize) -> f64 {
    let mut sse = 0.0;
    for i in from..to {
        let e = sample.target[i] - artifact.predict(&sample.features[i]);
        sse += e * e;
    }
    (sse / (to - from) as f64).sqrt()
}

/// Grow one depth-limited tree by greedy variance reduction.
fn grow_tree(
    features: &[Vec<f64>],
    residuals: &[f64],
    rows: &[usize],
    cols: &[usize],
    max_depth: usize,
    min_leaf: usize,
) -> Tree {
    let mut nodes = Vec::new();
    grow_node(features, residuals, rows, cols, max_depth, min_leaf, &mut nodes);
    Tree { nodes }
}

fn node_mean(residuals: &[f64], rows: &[usize]) -> f64 {
    rows.iter().map(|&i| residuals[i]).sum::<f64>() / rows.len().max(1) as f64
}

fn grow_node(
    features: &[Vec<f64>],
    residuals: &[f64],
    rows: &[usize],
    cols: &[usize],
    depth_left: usize,
    min_leaf: usize,
    nodes: &mut Vec<TreeNode>,
) -> usize {
    let idx = nodes.len();
    let value = node_mean(residuals, rows);
    nodes.push(TreeNode {
        feature: None,
        threshold: 0.0,
        left: 0,
        right: 0,
        value,
    });

    if depth_left == 0 || rows.len() < 2 * min_leaf.max(1) {
        return idx;
    }

    let Some((feature, threshold)) = best_split(features, residuals, rows, cols, min_leaf) else {
        return idx;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&i| features[i][feature] <= threshold);

    let left = grow_node(features, residuals, &left_rows, cols, depth_left - 1, min_leaf, nodes);
    let right = grow_node(features, residuals, &right_rows, cols, depth_left - 1, min_leaf, nodes);

    nodes[idx].feature = Some(feature);
    nodes[idx].threshold = threshold;
    nodes[idx].left = left;
    nodes[idx].right = right;
    idx
}

/// Best (feature, threshold) by squared-error reduction; `None` when no
/// split beats the parent.
fn best_split(
    features: &[Vec<f64>],
    residuals: &[f64],
    rows: &[usize],
    cols: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let total_sum: f64 = rows.iter().map(|&i| residuals[i]).sum();
    let n = rows.len() as f64;
    let parent_score = total_sum * total_sum / n;

    let mut best: Option<(f64, usize, f64)> = None;
    let min_leaf = min_leaf.max(1);

    for &f in cols {
        let mut order: Vec<usize> = rows.to_vec();
        order.sort_by(|&a, &b| {
            features[a][f]
                .partial_cmp(&features[b][f])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for (pos, &i) in order.iter().enumerate().take(order.len() - 1) {
            left_sum += residuals[i];
            let n_left = pos + 1;
            let n_right = order.len() - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            // No split between equal feature values.
            let here = features[i][f];
            let next = features[order[pos + 1]][f];
            if next <= here {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let score =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            let gain = score - parent_score;
            if gain > 1e-12 && best.map(|(g, _, _)| gain > g).unwrap_or(true) {
                best = Some((gain, f, 0.5 * (here + next)));
            }
        }
    }

    best.map(|(_, f, threshold)| (f, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{MonthlyPanel, month_end, next_month_end};
    use rand_distr::Normal;

    /// Panel where next-month return depends nonlinearly on growth_balance
    /// and linearly on delta_ff, with the remaining features pure noise.
    fn boost_panel(n: usize, seed: u64) -> MonthlyPanel {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();

        let growth: Vec<f64> = (0..n).map(|_| 0.01 * normal.sample(&mut rng)).collect();
        let dff: Vec<f64> = (0..n).map(|_| 0.1 * normal.sample(&mut rng)).collect();
        let noise1: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        let noise2: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        let noise3: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();

        // ret[t+1] = f(features[t]) + small noise.
        let mut ret = vec![f64::NAN; n];
        for t in 0..n - 1 {
            let signal = if growth[t] > 0.0 { 0.02 } else { -0.01 } - 0.05 * dff[t];
            ret[t + 1] = signal + 0.001 * normal.sample(&mut rng);
        }

        let mut months = Vec::with_capacity(n);
        let mut m = month_end(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        for _ in 0..n {
            months.push(m);
            m = next_month_end(m);
        }

        MonthlyPanel::new(
            months,
            vec![
                ("ret_sp500".into(), ret),
                ("growth_balance".into(), growth),
                ("delta_ff".into(), dff),
                ("delta_slope".into(), noise1),
                ("delta_spread".into(), noise2),
                ("delta_vix".into(), noise3),
            ],
        )
        .unwrap()
    }

    #[test]
    fn contributions_reconcile_to_prediction_minus_baseline() {
        let panel = boost_panel(200, 42);
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, &config).unwrap();
        let artifact = outcome.artifact.expect("enough rows to fit");

        for row in &outcome.sample.features {
            let prediction = artifact.predict(row);
            let total: f64 = artifact.contributions(row).iter().sum();
            assert!(
                (total - (prediction - artifact.baseline)).abs() < 1e-9,
                "conservation violated: {total} vs {}",
                prediction - artifact.baseline
            );
        }
    }

    #[test]
    fn learns_the_signal_features() {
        let panel = boost_panel(260, 7);
        let config = RunConfig::new("data", "results");
        let artifact = estimate(&panel, &config).unwrap().artifact.unwrap();

        // The two signal-bearing features should outrank the pure noise.
        let rank_of = |name: &str| {
            artifact
                .importance
                .iter()
                .position(|(n, _)| n == name)
                .unwrap()
        };
        assert!(rank_of("growth_balance") <= 2);
        assert!(rank_of("delta_ff") <= 2);

        // And the fit should beat predicting the mean on the holdout.
        let test_rmse = artifact.test_rmse.unwrap();
        assert!(test_rmse < 0.02, "test RMSE {test_rmse}");
    }

    #[test]
    fn fitting_is_deterministic_given_the_seed() {
        let panel = boost_panel(200, 3);
        let config = RunConfig::new("data", "results");
        let a = estimate(&panel, &config).unwrap().artifact.unwrap();
        let b = estimate(&panel, &config).unwrap().artifact.unwrap();
        assert_eq!(a.trees.len(), b.trees.len());
        assert_eq!(a.train_rmse, b.train_rmse);
        assert_eq!(a.test_rmse, b.test_rmse);
    }

    #[test]
    fn too_few_rows_skips_the_model_without_failing() {
        let panel = boost_panel(40, 5);
        let config = RunConfig::new("data", "results");
        let outcome = estimate(&panel, &config).unwrap();
        assert!(outcome.artifact.is_none());
        assert!(!outcome.notes.is_empty());
    }
}
