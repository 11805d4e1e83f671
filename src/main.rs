//! STGCN Traffic Forecasting API Server
//!
//! Thin serving wrapper around a pre-trained STGCN checkpoint: health and
//! model-info introspection plus a prediction endpoint that rolls the
//! network forward over the forecast horizon.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use ndarray::{s, Array2};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stgcn_server::config::Config;
use stgcn_server::dataset::{read_csv_matrix, Stats};
use stgcn_server::handlers;
use stgcn_server::model::ForecastEngine;
use stgcn_server::AppState;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stgcn_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("STGCN forecast server starting...");
    tracing::info!("Checkpoint dir: {}", config.model_dir);

    let mut state = AppState::new(config);

    // Startup load attempt; a missing checkpoint is not fatal, predictions
    // retry the load lazily.
    match state.engine.load(Path::new(&state.config.model_dir)) {
        Ok(meta) => tracing::info!("Model loaded from {}", meta.checkpoint),
        Err(e) => tracing::warn!("Model not loaded yet: {}", e),
    }

    state.fallback_window = load_fallback_window(&state.config, &state.engine);

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::check))
        .route("/api/predict", post(handlers::predict::predict))
        .route("/api/model/info", get(handlers::model_info::info))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Tail window of the configured readings file, z-scored. Serves predict
/// requests that carry no history of their own.
fn load_fallback_window(config: &Config, engine: &ForecastEngine) -> Option<Arc<Array2<f64>>> {
    let path = config.velocity_file();
    let series = match read_csv_matrix(&path) {
        Ok(series) => series,
        Err(e) => {
            tracing::warn!("No readings available for default predictions: {}", e);
            return None;
        }
    };

    let frames = config.n_his + 1;
    if series.nrows() < frames || series.ncols() < config.n_route {
        tracing::warn!(
            "Readings file {} too small for a {}-frame window over {} routes",
            path.display(),
            frames,
            config.n_route
        );
        return None;
    }

    // The checkpoint ships its training stats as a sidecar; a series-wide
    // estimate stands in when that is missing.
    if !engine.has_stats() {
        engine.set_stats(Stats::from_data(&series.slice(s![.., ..config.n_route])));
    }
    let stats = engine.stats();

    let start = series.nrows() - frames;
    let mut window = series.slice(s![start.., ..config.n_route]).to_owned();
    window.mapv_inplace(|v| stats.z_score(v));

    tracing::info!(
        "Default prediction window loaded from {} ({} frames)",
        path.display(),
        frames
    );
    Some(Arc::new(window))
}
