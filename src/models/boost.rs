//! Gradient-boosted regression trees (squared-error loss).
//!
//! Training:
//! 1. start every prediction at the target mean (`base_score`)
//! 2. each round, fit a [`RegressionTree`] to the current residuals on a row
//!    subsample (and optionally a column subsample)
//! 3. add `learning_rate × tree` to the running predictions
//!
//! With an evaluation set and `early_stopping_rounds`, training stops once the
//! evaluation MAE has not improved for that many rounds and the ensemble is
//! truncated to the best round.
//!
//! Models are persisted as JSON and checked against the current feature list on
//! load.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::domain::{FEATURE_NAMES, FeatureVector, N_FEATURES};
use crate::error::AppError;
use crate::math::{RegressionMetrics, mae};
use crate::models::tree::{RegressionTree, TreeParams};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows drawn (without replacement) per round.
    pub subsample: f64,
    /// Fraction of features offered to each tree.
    pub colsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
    pub early_stopping_rounds: Option<usize>,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.8,
            colsample: 1.0,
            min_samples_leaf: 1,
            seed: 42,
            early_stopping_rounds: None,
        }
    }
}

impl BoostParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.n_estimators == 0 {
            return Err(AppError::new(2, "n_estimators must be >= 1."));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(AppError::new(2, "learning_rate must be in (0, 1]."));
        }
        if self.max_depth == 0 {
            return Err(AppError::new(2, "max_depth must be >= 1."));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(AppError::new(2, "subsample must be in (0, 1]."));
        }
        if !(self.colsample > 0.0 && self.colsample <= 1.0) {
            return Err(AppError::new(2, "colsample must be in (0, 1]."));
        }
        if self.min_samples_leaf == 0 {
            return Err(AppError::new(2, "min_samples_leaf must be >= 1."));
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(AppError::new(2, "early stopping rounds must be >= 1."));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Held-out data used for early stopping.
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub x: &'a [FeatureVector],
    pub y: &'a [f64],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub params: BoostParams,
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
    /// Zero-based round kept by early stopping, if it triggered.
    #[serde(default)]
    pub best_iteration: Option<usize>,
    /// Test-set metrics recorded at training time.
    #[serde(default)]
    pub metrics: Option<RegressionMetrics>,
}

impl GradientBoostingModel {
    pub fn fit(
        params: &BoostParams,
        x: &[FeatureVector],
        y: &[f64],
        eval: Option<EvalSet<'_>>,
    ) -> Result<Self, AppError> {
        params.validate()?;
        if x.is_empty() {
            return Err(AppError::new(3, "No training rows."));
        }
        if x.len() != y.len() {
            return Err(AppError::new(4, "Feature and target lengths differ."));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::new(4, "Training targets must be finite."));
        }

        let n = x.len();
        let base_score = y.iter().sum::<f64>() / n as f64;
        let mut preds = vec![base_score; n];
        let mut residuals = vec![0.0; n];

        let mut eval_preds = eval.map(|e| vec![base_score; e.x.len()]);
        let mut best_mae = f64::INFINITY;
        let mut best_round = 0usize;

        let n_rows = sample_size(params.subsample, n);
        let n_cols = sample_size(params.colsample, N_FEATURES);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut best_iteration = None;

        tracing::info!(
            rows = n,
            rows_per_tree = n_rows,
            features_per_tree = n_cols,
            rounds = params.n_estimators,
            "training gradient boosting model"
        );

        for round in 0..params.n_estimators {
            for ((r, &t), &p) in residuals.iter_mut().zip(y).zip(&preds) {
                *r = t - p;
            }

            let rows = draw_indices(&mut rng, n, n_rows);
            let cols = draw_indices(&mut rng, N_FEATURES, n_cols);
            let tree = RegressionTree::fit(x, &residuals, &rows, &cols, params.tree_params());

            for (p, f) in preds.iter_mut().zip(x) {
                *p += params.learning_rate * tree.predict(f);
            }

            if let (Some(e), Some(ep)) = (eval, eval_preds.as_mut()) {
                for (p, f) in ep.iter_mut().zip(e.x) {
                    *p += params.learning_rate * tree.predict(f);
                }
                let m = mae(e.y, ep);
                tracing::debug!(round, eval_mae = m, "boosting round");

                if m < best_mae {
                    best_mae = m;
                    best_round = round;
                }
                trees.push(tree);

                if let Some(patience) = params.early_stopping_rounds {
                    if round - best_round >= patience {
                        tracing::info!(round, best_round, best_mae, "early stopping");
                        trees.truncate(best_round + 1);
                        best_iteration = Some(best_round);
                        break;
                    }
                }
            } else {
                trees.push(tree);
            }

            if (round + 1) % 50 == 0 {
                tracing::info!(round = round + 1, "boosting progress");
            }
        }

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            params: *params,
            base_score,
            trees,
            best_iteration,
            metrics: None,
        })
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let lr = self.params.learning_rate;
        self.base_score + self.trees.iter().map(|t| lr * t.predict(x)).sum::<f64>()
    }

    pub fn predict_batch(&self, xs: &[FeatureVector]) -> Vec<f64> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path)
            .map_err(|e| AppError::new(2, format!("Failed to create model file '{}': {e}", path.display())))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .map_err(|e| AppError::new(2, format!("Failed to write model '{}': {e}", path.display())))?;
        tracing::info!(path = %path.display(), trees = self.trees.len(), "saved model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open model '{}': {e}", path.display())))?;
        let model: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::new(2, format!("Invalid model file '{}': {e}", path.display())))?;
        model
            .check_compatible()
            .map_err(|e| AppError::new(2, format!("Incompatible model '{}': {e}", path.display())))?;
        tracing::debug!(path = %path.display(), trees = model.trees.len(), "loaded model");
        Ok(model)
    }

    fn check_compatible(&self) -> Result<(), String> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(format!(
                "format version {} (expected {MODEL_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(format!("feature list [{}] does not match", self.feature_names.join(", ")));
        }
        if !self.base_score.is_finite() || !self.params.learning_rate.is_finite() {
            return Err("non-finite base score or learning rate".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

fn sample_size(fraction: f64, n: usize) -> usize {
    ((fraction * n as f64).round() as usize).clamp(1, n.max(1))
}

/// `k` distinct indices from `0..n`, sorted. All indices when `k >= n`.
fn draw_indices(rng: &mut StdRng, n: usize, k: usize) -> Vec<usize> {
    if k >= n {
        return (0..n).collect();
    }
    let mut idx = rand::seq::index::sample(rng, n, k).into_vec();
    idx.sort_unstable();
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Risk rises with DHW in steps, plus a small SST effect.
    fn synthetic(n: usize) -> (Vec<FeatureVector>, Vec<f64>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let dhw = (i % 24) as f64 * 0.5;
            let sst = 27.0 + (i % 7) as f64 * 0.5;
            let mut f = [0.0; N_FEATURES];
            f[0] = sst;
            f[2] = dhw;
            f[6] = 2000.0 + (i % 5) as f64;
            x.push(FeatureVector(f));
            let band = if dhw == 0.0 {
                3.0
            } else if dhw < 4.0 {
                20.0
            } else if dhw < 8.0 {
                45.0
            } else {
                75.0
            };
            y.push(band + (sst - 27.0));
        }
        (x, y)
    }

    fn small_params() -> BoostParams {
        BoostParams {
            n_estimators: 60,
            learning_rate: 0.2,
            max_depth: 3,
            ..BoostParams::default()
        }
    }

    #[test]
    fn boosting_fits_synthetic_bands() {
        let (x, y) = synthetic(240);
        let model = GradientBoostingModel::fit(&small_params(), &x, &y, None).unwrap();
        assert_eq!(model.n_trees(), 60);

        let preds = model.predict_batch(&x);
        let m = RegressionMetrics::compute(&y, &preds);
        assert!(m.r2 > 0.95, "r2 = {}", m.r2);
        assert!(m.mae < 3.0, "mae = {}", m.mae);

        // Higher DHW at the same SST predicts higher risk.
        let low = model.predict(&x[1].with_drivers(28.0, 1.0));
        let high = model.predict(&x[1].with_drivers(28.0, 10.0));
        assert!(high > low + 30.0);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let (x, y) = synthetic(120);
        let a = GradientBoostingModel::fit(&small_params(), &x, &y, None).unwrap();
        let b = GradientBoostingModel::fit(&small_params(), &x, &y, None).unwrap();
        assert_eq!(a, b);

        let other = BoostParams {
            seed: 7,
            ..small_params()
        };
        let c = GradientBoostingModel::fit(&other, &x, &y, None).unwrap();
        assert_ne!(a.trees, c.trees);
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        // Integer targets with an integer mean: one deep tree at lr=1 fits them
        // exactly, so later rounds cannot improve the evaluation MAE.
        let x: Vec<FeatureVector> = (0..8)
            .map(|i| {
                let mut f = [0.0; N_FEATURES];
                f[0] = i as f64;
                FeatureVector(f)
            })
            .collect();
        let y: Vec<f64> = (0..8).map(|i| (i * 2) as f64).collect();
        let params = BoostParams {
            n_estimators: 100,
            learning_rate: 1.0,
            max_depth: 6,
            subsample: 1.0,
            early_stopping_rounds: Some(5),
            ..BoostParams::default()
        };

        let eval = EvalSet { x: &x, y: &y };
        let model = GradientBoostingModel::fit(&params, &x, &y, Some(eval)).unwrap();
        assert_eq!(model.best_iteration, Some(0));
        assert_eq!(model.n_trees(), 1);
        assert_eq!(model.predict(&x[3]), 6.0);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let (x, y) = synthetic(10);
        for bad in [
            BoostParams { n_estimators: 0, ..BoostParams::default() },
            BoostParams { learning_rate: 0.0, ..BoostParams::default() },
            BoostParams { subsample: 1.5, ..BoostParams::default() },
            BoostParams { colsample: 0.0, ..BoostParams::default() },
            BoostParams { max_depth: 0, ..BoostParams::default() },
        ] {
            let err = GradientBoostingModel::fit(&bad, &x, &y, None).unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }
        assert_eq!(
            GradientBoostingModel::fit(&BoostParams::default(), &[], &[], None)
                .unwrap_err()
                .exit_code(),
            3
        );
    }

    #[test]
    fn min_samples_leaf_above_row_count_fits_leaves_only() {
        let (x, y) = synthetic(40);
        let params = BoostParams {
            n_estimators: 3,
            min_samples_leaf: usize::MAX,
            subsample: 1.0,
            ..BoostParams::default()
        };
        let model = GradientBoostingModel::fit(&params, &x, &y, None).unwrap();
        assert!(model.trees.iter().all(|t| t.n_leaves() == 1));
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.predict(&x[0]) - mean).abs() < 1e-9);
    }

    #[test]
    fn saved_model_reloads_and_predicts_identically() {
        let (x, y) = synthetic(80);
        let model = GradientBoostingModel::fit(
            &BoostParams {
                n_estimators: 10,
                colsample: 0.6,
                ..small_params()
            },
            &x,
            &y,
            None,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let loaded = GradientBoostingModel::load(&path).unwrap();
        for f in &x {
            assert_eq!(model.predict(f), loaded.predict(f));
        }
    }

    #[test]
    fn load_rejects_foreign_feature_list() {
        let (x, y) = synthetic(20);
        let mut model = GradientBoostingModel::fit(&small_params(), &x, &y, None).unwrap();
        model.feature_names[0] = "sst_kelvin".to_string();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let err = GradientBoostingModel::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("feature list"));

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(GradientBoostingModel::load(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn load_rejects_unknown_format_version() {
        let (x, y) = synthetic(20);
        let mut model = GradientBoostingModel::fit(&small_params(), &x, &y, None).unwrap();
        model.format_version = MODEL_FORMAT_VERSION + 1;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let err = GradientBoostingModel::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("format version"));
    }
}
