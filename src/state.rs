//! Shared application state

use std::sync::Arc;

use ndarray::Array2;

use crate::config::Config;
use crate::model::ForecastEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ForecastEngine>,
    /// Most recent `(n_his + 1)`-frame window of the configured readings,
    /// z-scored at startup. Serves requests that carry no history of their
    /// own.
    pub fallback_window: Option<Arc<Array2<f64>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let engine = Arc::new(ForecastEngine::new(
            config.n_his,
            config.n_pred,
            config.n_route,
        ));
        Self {
            config,
            engine,
            fallback_window: None,
        }
    }
}
