//! Model information handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelInfoResponse {
    pub model_name: &'static str,
    pub description: &'static str,
    pub model_loaded: bool,
    pub parameters: ModelParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointInfo>,
}

#[derive(Serialize)]
pub struct ModelParameters {
    pub n_route: usize,
    pub n_his: usize,
    pub n_pred: usize,
    pub batch_size: usize,
}

#[derive(Serialize)]
pub struct CheckpointInfo {
    pub path: String,
    pub checksum: String,
    pub loaded_at: DateTime<Utc>,
}

pub async fn info(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    let metadata = state.engine.metadata();

    Json(ModelInfoResponse {
        model_name: "STGCN",
        description: "Spatio-temporal Graph Convolutional Networks for Traffic Prediction",
        model_loaded: metadata.is_some(),
        parameters: ModelParameters {
            n_route: state.config.n_route,
            n_his: state.config.n_his,
            n_pred: state.config.n_pred,
            batch_size: state.config.batch_size,
        },
        checkpoint: metadata.map(|m| CheckpointInfo {
            path: m.checkpoint,
            checksum: m.checksum,
            loaded_at: m.loaded_at,
        }),
    })
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
            n_route: 228,
            n_his: 12,
            n_pred: 9,
            batch_size: 50,
            day_slot: 288,
            environment: "development".to_string(),
        })
    }

    #[tokio::test]
    async fn parameters_echo_configuration() {
        let Json(body) = info(State(test_state())).await;
        assert_eq!(body.model_name, "STGCN");
        assert!(!body.model_loaded);
        assert!(body.checkpoint.is_none());
        assert_eq!(body.parameters.n_route, 228);
        assert_eq!(body.parameters.n_his, 12);
        assert_eq!(body.parameters.n_pred, 9);
        assert_eq!(body.parameters.batch_size, 50);
    }
}
