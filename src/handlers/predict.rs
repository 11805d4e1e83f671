//! Traffic prediction handler
//!
//! Runs a real multi-step forecast against the loaded checkpoint. The
//! response keeps the dashboard's shape: nested per-step predictions, a
//! scenario label derived from the forecast itself, and a confidence block
//! backed by the last offline evaluation.

use std::path::Path;

use axum::{extract::State, Json};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::metrics::EvalReport;
use crate::model::checkpoint;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    /// Optional `(n_his + 1) x n_route` history window, most recent frame
    /// last. Absent history falls back to the readings loaded at startup.
    #[serde(default)]
    pub history: Option<Vec<Vec<f64>>>,

    /// Whether the supplied history is already z-scored. Raw readings are
    /// normalized with the model's training statistics.
    #[serde(default)]
    pub normalized: bool,
}

#[derive(Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Vec<Vec<f64>>>,
    pub message: &'static str,
    pub scenario: String,
    pub confidence: Option<Confidence>,
}

#[derive(Serialize)]
pub struct Confidence {
    pub score: f64,
    pub level: &'static str,
    pub explanation: String,
}

pub async fn predict(
    State(state): State<AppState>,
    body: Option<Json<PredictRequest>>,
) -> AppResult<Json<PredictResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    // One lazy load attempt before giving up, as the original server did.
    if !state.engine.is_loaded() {
        if let Err(e) = state.engine.load(Path::new(&state.config.model_dir)) {
            tracing::warn!("Model load failed: {}", e);
        }
    }
    if !state.engine.is_loaded() {
        return Err(AppError::ModelNotLoaded);
    }

    let stats = state.engine.stats();
    let window = match req.history {
        Some(history) => {
            let mut w = history_window(&history, state.config.n_his + 1, state.config.n_route)?;
            if !req.normalized {
                w.mapv_inplace(|v| stats.z_score(v));
            }
            w
        }
        None => match &state.fallback_window {
            Some(w) => w.as_ref().clone(),
            None => {
                return Err(AppError::ValidationError(
                    "request carries no history and no readings file is configured".to_string(),
                ))
            }
        },
    };

    let forecast = state.engine.predict(&window)?;

    let mean = forecast.mean().unwrap_or(0.0);
    let scenario = scenario_label(mean);
    let confidence =
        checkpoint::load_eval_report(Path::new(&state.config.model_dir)).map(confidence_from_report);

    // (n_pred, n_route) -> [[ [v]; n_route ]; n_pred], the dashboard's nesting.
    let predictions = forecast
        .outer_iter()
        .map(|step| step.iter().map(|&v| vec![v]).collect())
        .collect();

    tracing::debug!("Forecast served: scenario={}, mean={:.3}", scenario, mean);

    Ok(Json(PredictResponse {
        predictions,
        message: "Prediction successful",
        scenario: scenario.to_string(),
        confidence,
    }))
}

fn history_window(
    history: &[Vec<f64>],
    frames: usize,
    n_route: usize,
) -> Result<Array2<f64>, AppError> {
    if history.len() != frames {
        return Err(AppError::ValidationError(format!(
            "history must hold {} frames, got {}",
            frames,
            history.len()
        )));
    }

    let mut w = Array2::zeros((frames, n_route));
    for (t, row) in history.iter().enumerate() {
        if row.len() != n_route {
            return Err(AppError::ValidationError(format!(
                "frame {} has {} routes, expected {}",
                t,
                row.len(),
                n_route
            )));
        }
        for (r, &v) in row.iter().enumerate() {
            if !v.is_finite() {
                return Err(AppError::ValidationError(format!(
                    "non-finite reading at frame {}, route {}",
                    t, r
                )));
            }
            w[(t, r)] = v;
        }
    }
    Ok(w)
}

/// Dashboard banding of the mean predicted z-score.
fn scenario_label(mean: f64) -> &'static str {
    if mean < -1.0 {
        "Very Light Traffic"
    } else if mean < 0.0 {
        "Light Traffic"
    } else if mean < 0.5 {
        "Moderate Traffic"
    } else if mean < 1.0 {
        "Heavy Traffic"
    } else {
        "Very Heavy Traffic"
    }
}

fn confidence_from_report(report: EvalReport) -> Confidence {
    let score = ((1.0 - report.mape) * 100.0).clamp(0.0, 100.0);
    let level = if report.mape < 0.10 {
        "High"
    } else if report.mape < 0.20 {
        "Medium"
    } else {
        "Low"
    };
    Confidence {
        score,
        level,
        explanation: format!(
            "Model scored {:.1}% MAPE over {} test windows at horizon step {}",
            report.mape * 100.0,
            report.samples,
            report.step
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state() -> AppState {
        AppState::new(Config {
            port: 5000,
            model_dir: "/nonexistent".to_string(),
            dataset_dir: "/nonexistent".to_string(),
            n_route: 2,
            n_his: 2,
            n_pred: 3,
            batch_size: 2,
            day_slot: 288,
            environment: "development".to_string(),
        })
    }

    #[tokio::test]
    async fn missing_model_is_reported_as_unavailable() {
        let result = predict(State(test_state()), None).await;
        assert!(matches!(result, Err(AppError::ModelNotLoaded)));
    }

    #[test]
    fn history_window_checks_frame_count() {
        let history = vec![vec![1.0, 2.0]; 2];
        assert!(matches!(
            history_window(&history, 3, 2),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn history_window_checks_route_count() {
        let history = vec![vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0]];
        assert!(matches!(
            history_window(&history, 3, 2),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn history_window_rejects_non_finite() {
        let history = vec![vec![1.0, 2.0], vec![1.0, f64::NAN], vec![1.0, 2.0]];
        assert!(matches!(
            history_window(&history, 3, 2),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn history_window_builds_matrix() {
        let history = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let w = history_window(&history, 3, 2).unwrap();
        assert_eq!(w.shape(), &[3, 2]);
        assert_eq!(w[(2, 1)], 6.0);
    }

    #[test]
    fn scenario_bands_follow_dashboard_thresholds() {
        assert_eq!(scenario_label(-1.5), "Very Light Traffic");
        assert_eq!(scenario_label(-0.3), "Light Traffic");
        assert_eq!(scenario_label(0.2), "Moderate Traffic");
        assert_eq!(scenario_label(0.7), "Heavy Traffic");
        assert_eq!(scenario_label(1.8), "Very Heavy Traffic");
    }

    #[test]
    fn confidence_tracks_evaluation_mape() {
        let report = EvalReport {
            step: 9,
            samples: 10,
            mape: 0.07,
            mae: 2.5,
            rmse: 4.3,
            evaluated_at: chrono::Utc::now(),
        };
        let confidence = confidence_from_report(report);
        assert!((confidence.score - 93.0).abs() < 1e-9);
        assert_eq!(confidence.level, "High");

        let weak = confidence_from_report(EvalReport {
            step: 9,
            samples: 10,
            mape: 0.25,
            mae: 9.0,
            rmse: 14.0,
            evaluated_at: chrono::Utc::now(),
        });
        assert_eq!(weak.level, "Low");
    }
}
