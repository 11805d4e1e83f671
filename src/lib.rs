//! STGCN traffic forecasting server.
//!
//! Serves multi-step traffic forecasts from a pre-trained spatio-temporal
//! graph convolutional network checkpoint, plus the numeric plumbing around
//! it: graph kernel construction, sliding-window dataset generation, z-score
//! normalization, and MAPE/MAE/RMSE scoring.

pub mod config;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod metrics;
pub mod model;
pub mod state;

pub use error::{AppError, AppResult};
pub use state::AppState;
