//! Forecast accuracy metrics
//!
//! MAPE / MAE / RMSE, always computed in the original measurement units
//! (inverse-normalized), never on z-scores.

use chrono::{DateTime, Utc};
use ndarray::{ArrayView4, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::dataset::{DataError, Stats};

/// Mean absolute percentage error with a small denominator guard.
pub fn mape(truth: &ArrayViewD<f64>, pred: &ArrayViewD<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred.iter())
        .map(|(v, v_)| ((v_ - v) / (v + 1e-5)).abs())
        .sum::<f64>()
        / n as f64
}

/// Mean absolute error.
pub fn mae(truth: &ArrayViewD<f64>, pred: &ArrayViewD<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred.iter())
        .map(|(v, v_)| (v_ - v).abs())
        .sum::<f64>()
        / n as f64
}

/// Root mean squared error.
pub fn rmse(truth: &ArrayViewD<f64>, pred: &ArrayViewD<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    (truth
        .iter()
        .zip(pred.iter())
        .map(|(v, v_)| (v_ - v).powi(2))
        .sum::<f64>()
        / n as f64)
        .sqrt()
}

/// Accuracy metrics for one horizon step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepMetrics {
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
}

/// Score one horizon step: inverse-z-score both tensors, then compute the
/// three metrics.
pub fn evaluate_step(
    truth: &ArrayViewD<f64>,
    pred: &ArrayViewD<f64>,
    stats: Stats,
) -> Result<StepMetrics, DataError> {
    if truth.shape() != pred.shape() {
        return Err(DataError::Shape(format!(
            "truth shape {:?} does not match prediction shape {:?}",
            truth.shape(),
            pred.shape()
        )));
    }

    let t = truth.mapv(|v| stats.z_inverse(v));
    let p = pred.mapv(|v| stats.z_inverse(v));
    Ok(StepMetrics {
        mape: mape(&t.view(), &p.view()),
        mae: mae(&t.view(), &p.view()),
        rmse: rmse(&t.view(), &p.view()),
    })
}

/// Per-step metrics over multi-step tensors laid out as
/// `(n_step, batch, n_route, 1)`.
pub fn evaluate(
    truth: &ArrayView4<f64>,
    pred: &ArrayView4<f64>,
    stats: Stats,
) -> Result<Vec<StepMetrics>, DataError> {
    if truth.shape() != pred.shape() {
        return Err(DataError::Shape(format!(
            "truth shape {:?} does not match prediction shape {:?}",
            truth.shape(),
            pred.shape()
        )));
    }

    truth
        .outer_iter()
        .zip(pred.outer_iter())
        .map(|(t, p)| evaluate_step(&t.into_dyn(), &p.into_dyn(), stats))
        .collect()
}

/// Persisted result of an offline evaluation run, written next to the
/// checkpoint and surfaced by the API's confidence reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Horizon step the metrics were computed at (1-based)
    pub step: usize,
    /// Number of test windows scored
    pub samples: usize,
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array4};

    fn dynify(v: Vec<f64>) -> ndarray::ArrayD<f64> {
        Array1::from_vec(v).into_dyn()
    }

    #[test]
    fn perfect_prediction_scores_zero() {
        let truth = dynify(vec![1.0, 2.0, 4.0]);
        let m = evaluate_step(&truth.view(), &truth.view(), Stats::identity()).unwrap();
        assert_eq!(m.mape, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
    }

    #[test]
    fn unit_offset_errors() {
        let truth = dynify(vec![1.0, 2.0, 4.0]);
        let pred = dynify(vec![2.0, 3.0, 5.0]);
        let m = evaluate_step(&truth.view(), &pred.view(), Stats::identity()).unwrap();

        assert!((m.mae - 1.0).abs() < 1e-12);
        assert!((m.rmse - 1.0).abs() < 1e-12);
        // (1/1 + 1/2 + 1/4) / 3, modulo the denominator guard
        assert!((m.mape - 0.5833).abs() < 1e-3);
    }

    #[test]
    fn evaluation_inverse_normalizes_first() {
        let truth = dynify(vec![0.0, 1.0]);
        let pred = dynify(vec![1.0, 2.0]);
        let stats = Stats {
            mean: 10.0,
            std: 2.0,
        };
        // In original units the gap is one std: 2.0.
        let m = evaluate_step(&truth.view(), &pred.view(), stats).unwrap();
        assert!((m.mae - 2.0).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let truth = dynify(vec![1.0, 2.0]);
        let pred = dynify(vec![1.0]);
        assert!(evaluate_step(&truth.view(), &pred.view(), Stats::identity()).is_err());
    }

    #[test]
    fn multi_step_scores_each_horizon() {
        // 2 steps, 1 window, 2 routes.
        let truth = Array4::from_shape_fn((2, 1, 2, 1), |(s, _, r, _)| (s + r) as f64);
        let mut pred = truth.clone();
        // Perturb only the second step.
        pred[(1, 0, 0, 0)] += 1.0;
        pred[(1, 0, 1, 0)] += 1.0;

        let steps = evaluate(&truth.view(), &pred.view(), Stats::identity()).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].mae, 0.0);
        assert!((steps[1].mae - 1.0).abs() < 1e-12);
    }
}
