//! Training orchestration: split, fit, evaluate.

use crate::domain::{FeatureVector, ProcessedRecord};
use crate::error::AppError;
use crate::math::{RegressionMetrics, Split, train_test_split};
use crate::models::{BoostParams, EvalSet, GradientBoostingModel};

/// Fewer rows than this cannot be split and evaluated meaningfully.
pub const MIN_TRAINING_ROWS: usize = 10;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub params: BoostParams,
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            params: BoostParams::default(),
            test_fraction: crate::math::DEFAULT_TEST_FRACTION,
            split_seed: crate::math::DEFAULT_SPLIT_SEED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Fitted model with test metrics attached.
    pub model: GradientBoostingModel,
    pub n_train: usize,
    pub n_test: usize,
    pub metrics: RegressionMetrics,
}

/// Train on a seeded 80/20 split of `records` and score the held-out rows.
///
/// When early stopping is enabled the held-out rows double as the evaluation
/// set, as in the usual `eval_set=[(X_test, y_test)]` setup.
pub fn train_from_processed(records: &[ProcessedRecord], opts: &TrainOptions) -> Result<TrainOutcome, AppError> {
    opts.params.validate()?;
    if records.len() < MIN_TRAINING_ROWS {
        return Err(AppError::new(
            3,
            format!(
                "Need at least {MIN_TRAINING_ROWS} processed rows to train, found {}.",
                records.len()
            ),
        ));
    }

    let Split { train, test } = train_test_split(records.len(), opts.test_fraction, opts.split_seed)?;
    let (x_train, y_train) = gather(records, &train);
    let (x_test, y_test) = gather(records, &test);

    tracing::info!(n_train = train.len(), n_test = test.len(), "split dataset");

    let eval = opts
        .params
        .early_stopping_rounds
        .map(|_| EvalSet { x: &x_test, y: &y_test });
    let mut model = GradientBoostingModel::fit(&opts.params, &x_train, &y_train, eval)?;

    let preds = model.predict_batch(&x_test);
    let metrics = RegressionMetrics::compute(&y_test, &preds);
    if !(metrics.r2.is_finite() && metrics.mae.is_finite()) {
        return Err(AppError::new(4, "Model evaluation produced non-finite metrics."));
    }
    model.metrics = Some(metrics);

    tracing::info!(r2 = metrics.r2, mae = metrics.mae, rmse = metrics.rmse, "evaluated model");

    Ok(TrainOutcome {
        model,
        n_train: train.len(),
        n_test: test.len(),
        metrics,
    })
}

fn gather(records: &[ProcessedRecord], idx: &[usize]) -> (Vec<FeatureVector>, Vec<f64>) {
    idx.iter()
        .map(|&i| (records[i].features, records[i].bleaching_risk_percent))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrwValues, Observation, parse_time};
    use crate::prep::{apply_heuristic_labels, build_records};

    fn labeled(n: usize) -> Vec<ProcessedRecord> {
        let base = parse_time("2019-01-01").unwrap();
        let obs: Vec<Observation> = (0..n)
            .map(|i| {
                let dhw = (i % 30) as f64 * 0.4;
                Observation {
                    time: base + chrono::Duration::days(i as i64),
                    latitude: 10.56,
                    longitude: 72.64,
                    location_name: "Lakshadweep_Islands".to_string(),
                    values: CrwValues {
                        sst: Some(28.0 + dhw * 0.2),
                        hotspot: Some(dhw / 4.0),
                        dhw: Some(dhw),
                        sst_anomaly: Some(dhw / 5.0),
                        baa: Some((dhw / 4.0).floor().min(4.0)),
                        baa_7d_max: Some((dhw / 4.0).floor().min(4.0)),
                    },
                }
            })
            .collect();
        let (mut records, _) = build_records(&obs);
        apply_heuristic_labels(&mut records, 42);
        records
    }

    #[test]
    fn trains_and_scores_holdout() {
        let records = labeled(300);
        let opts = TrainOptions {
            params: BoostParams {
                n_estimators: 40,
                learning_rate: 0.2,
                max_depth: 4,
                ..BoostParams::default()
            },
            ..TrainOptions::default()
        };

        let out = train_from_processed(&records, &opts).unwrap();
        assert_eq!(out.n_test, 60);
        assert_eq!(out.n_train, 240);
        // Labels are noisy within bands but the bands dominate.
        assert!(out.metrics.r2 > 0.6, "r2 = {}", out.metrics.r2);
        assert_eq!(out.model.metrics, Some(out.metrics));
    }

    #[test]
    fn too_few_rows_is_exit_3() {
        let records = labeled(9);
        let err = train_from_processed(&records, &TrainOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
