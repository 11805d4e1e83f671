//! Error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::dataset::DataError;
use crate::graph::GraphError;
use crate::model::InferenceError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Model errors
    ModelNotLoaded,
    InferenceError(String),

    // Validation errors
    ValidationError(String),

    // Resource errors
    NotFound(String),

    // Dataset errors
    DataError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ModelNotLoaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Model not available. Ensure a checkpoint is exported and readable",
            ),
            AppError::InferenceError(msg) => {
                tracing::error!("Inference error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Inference failed")
            }
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::DataError(msg) => {
                tracing::error!("Dataset error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Dataset error occurred")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        match &err {
            InferenceError::NotLoaded | InferenceError::NoCheckpoint(_) => AppError::ModelNotLoaded,
            InferenceError::BadWindow { .. } => AppError::ValidationError(err.to_string()),
            _ => AppError::InferenceError(err.to_string()),
        }
    }
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        AppError::DataError(err.to_string())
    }
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        AppError::DataError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_maps_to_service_unavailable() {
        let response = AppError::ModelNotLoaded.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let response = AppError::ValidationError("bad window".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn inference_failures_map_to_internal_error() {
        let response = AppError::InferenceError("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unloaded_engine_errors_convert_to_model_not_loaded() {
        let err: AppError = InferenceError::NotLoaded.into();
        assert!(matches!(err, AppError::ModelNotLoaded));

        let err: AppError = InferenceError::NoCheckpoint("./output/models".to_string()).into();
        assert!(matches!(err, AppError::ModelNotLoaded));
    }

    #[test]
    fn bad_window_converts_to_validation() {
        let err: AppError = InferenceError::BadWindow {
            expected: 13,
            routes: 228,
            frames: 5,
            got_routes: 228,
        }
        .into();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
