//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.engine.is_loaded(),
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
            n_route: 4,
            n_his: 2,
            n_pred: 3,
            batch_size: 2,
            day_slot: 288,
            environment: "development".to_string(),
        })
    }

    #[tokio::test]
    async fn healthy_without_model() {
        let Json(body) = check(State(test_state())).await;
        assert_eq!(body.status, "healthy");
        assert!(!body.model_loaded);
    }
}
