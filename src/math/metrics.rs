//! Regression metrics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self {
            r2: r2(y_true, y_pred),
            mae: mae(y_true, y_pred),
            rmse: rmse(y_true, y_pred),
        }
    }
}

/// Coefficient of determination.
///
/// For a constant `y_true` this is 1 when the fit is exact and 0 otherwise.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    let mean = y_true[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y_true[..n].iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true[..n]
        .iter()
        .zip(&y_pred[..n])
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    y_true.iter().zip(y_pred).map(|(y, p)| (y - p).abs()).sum::<f64>() / n as f64
}

pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    let mse = y_true.iter().zip(y_pred).map(|(y, p)| (y - p).powi(2)).sum::<f64>() / n as f64;
    mse.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_fit() {
        let y = [1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute(&y, &y);
        assert_eq!(m, RegressionMetrics { r2: 1.0, mae: 0.0, rmse: 0.0 });
    }

    #[test]
    fn known_values() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let p = [1.5, 2.0, 2.0, 4.0];
        // ss_res = 0.25 + 1 = 1.25, ss_tot = 5
        assert!((r2(&y, &p) - 0.75).abs() < 1e-12);
        assert!((mae(&y, &p) - 0.375).abs() < 1e-12);
        assert!((rmse(&y, &p) - (1.25f64 / 4.0).sqrt()).abs() < 1e-12);

        // Predicting the mean scores zero.
        assert!(r2(&y, &[2.5; 4]).abs() < 1e-12);
    }

    #[test]
    fn constant_targets() {
        assert_eq!(r2(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2(&[2.0, 2.0], &[2.0, 3.0]), 0.0);
        assert_eq!(mae(&[], &[]), 0.0);
    }
}
