//! Model loading and inference

pub mod checkpoint;
pub mod inference;

pub use inference::{EngineStatus, ForecastEngine, InferenceError, ModelMetadata};
