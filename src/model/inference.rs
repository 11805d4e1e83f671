//! Inference engine - ONNX Runtime integration
//!
//! Loads the exported STGCN checkpoint and rolls it forward over the
//! forecast horizon. The engine is owned by the application state and passed
//! explicitly; all access goes through its own locks.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Stats;

use super::checkpoint;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("no .onnx checkpoint under {0}")]
    NoCheckpoint(String),

    #[error("checkpoint i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load checkpoint {path}: {message}")]
    Load { path: String, message: String },

    #[error("history window must be {expected} frames of {routes} routes, got {frames}x{got_routes}")]
    BadWindow {
        expected: usize,
        routes: usize,
        frames: usize,
        got_routes: usize,
    },

    #[error("inference failed: {0}")]
    Run(String),

    #[error("cannot persist evaluation report: {0}")]
    Report(String),
}

/// Loaded checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub checkpoint: String,
    pub checksum: String,
    pub n_his: usize,
    pub n_pred: usize,
    pub n_route: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Engine health snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub model_loaded: bool,
    pub checkpoint: String,
    pub avg_latency_ms: f32,
    pub inference_count: u64,
}

/// Process-wide model handle: ONNX session, checkpoint metadata, and the
/// z-score parameters the network was trained with.
pub struct ForecastEngine {
    n_his: usize,
    n_pred: usize,
    n_route: usize,
    session: RwLock<Option<Session>>,
    metadata: RwLock<Option<ModelMetadata>>,
    stats: RwLock<Option<Stats>>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl ForecastEngine {
    pub fn new(n_his: usize, n_pred: usize, n_route: usize) -> Self {
        Self {
            n_his,
            n_pred,
            n_route,
            session: RwLock::new(None),
            metadata: RwLock::new(None),
            stats: RwLock::new(None),
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    /// Load the newest checkpoint under `dir`, fingerprint it, and pick up
    /// the training stats sidecar when present. Failure leaves the engine
    /// unloaded.
    pub fn load(&self, dir: &Path) -> Result<ModelMetadata, InferenceError> {
        let path = checkpoint::find_latest_checkpoint(dir)?;
        tracing::info!("Loading checkpoint from {}", path.display());

        let session = Session::builder()
            .map_err(|e| InferenceError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .commit_from_file(&path)
            .map_err(|e| InferenceError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let checksum = checkpoint::checkpoint_checksum(&path)?;
        if let Some(stats) = checkpoint::load_training_stats(dir) {
            *self.stats.write() = Some(stats);
        }

        let metadata = ModelMetadata {
            checkpoint: path.display().to_string(),
            checksum,
            n_his: self.n_his,
            n_pred: self.n_pred,
            n_route: self.n_route,
            loaded_at: Utc::now(),
        };

        *self.session.write() = Some(session);
        *self.metadata.write() = Some(metadata.clone());
        tracing::info!("Checkpoint loaded (sha256 {})", &metadata.checksum[..12]);

        Ok(metadata)
    }

    pub fn is_loaded(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.metadata.read().clone()
    }

    /// Normalization parameters; identity until a sidecar or the evaluation
    /// pipeline provides real ones.
    pub fn stats(&self) -> Stats {
        self.stats.read().unwrap_or_else(Stats::identity)
    }

    pub fn has_stats(&self) -> bool {
        self.stats.read().is_some()
    }

    pub fn set_stats(&self, stats: Stats) {
        *self.stats.write() = Some(stats);
    }

    pub fn status(&self) -> EngineStatus {
        let metadata = self.metadata.read();
        let (loaded, checkpoint) = match metadata.as_ref() {
            Some(meta) => (true, meta.checkpoint.clone()),
            None => (false, "None".to_string()),
        };

        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 {
            (sum as f32 / count as f32) / 1000.0
        } else {
            0.0
        };

        EngineStatus {
            model_loaded: loaded,
            checkpoint,
            avg_latency_ms: avg,
            inference_count: count,
        }
    }

    /// Multi-step rollout over the forecast horizon.
    ///
    /// `window` is the z-scored `(n_his + 1, n_route)` history, most recent
    /// frame last. Each step feeds the rolling window through the network,
    /// shifts it left, and appends the one-step-ahead frame, exactly as the
    /// checkpoint was served during training. Returns `(n_pred, n_route)`
    /// forecasts in z-score space.
    pub fn predict(&self, window: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        let frames = self.n_his + 1;
        if window.nrows() != frames || window.ncols() != self.n_route {
            return Err(InferenceError::BadWindow {
                expected: frames,
                routes: self.n_route,
                frames: window.nrows(),
                got_routes: window.ncols(),
            });
        }

        let start = std::time::Instant::now();
        let mut session_guard = self.session.write();
        let session = session_guard.as_mut().ok_or(InferenceError::NotLoaded)?;

        let mut seq = Array4::<f32>::zeros((1, frames, self.n_route, 1));
        for t in 0..frames {
            for r in 0..self.n_route {
                seq[(0, t, r, 0)] = window[(t, r)] as f32;
            }
        }

        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| InferenceError::Run("model defines no output".to_string()))?;

        let mut forecast = Array2::<f64>::zeros((self.n_pred, self.n_route));
        for step in 0..self.n_pred {
            let input = Value::from_array(seq.clone())
                .map_err(|e| InferenceError::Run(e.to_string()))?;
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| InferenceError::Run(e.to_string()))?;
            let output = outputs
                .get(&output_name)
                .ok_or_else(|| InferenceError::Run("missing model output".to_string()))?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Run(e.to_string()))?;

            if data.len() < self.n_route {
                return Err(InferenceError::Run(format!(
                    "model produced {} values, expected {}",
                    data.len(),
                    self.n_route
                )));
            }

            for r in 0..self.n_route {
                forecast[(step, r)] = data[r] as f64;
            }

            // Slide: frames 1..n_his shift left, the prediction enters at
            // n_his - 1, matching the window layout the network was trained on.
            for t in 0..self.n_his - 1 {
                for r in 0..self.n_route {
                    seq[(0, t, r, 0)] = seq[(0, t + 1, r, 0)];
                }
            }
            for r in 0..self.n_route {
                seq[(0, self.n_his - 1, r, 0)] = data[r] as f32;
            }
        }
        drop(session_guard);

        let elapsed = start.elapsed().as_micros() as u64;
        self.latency_sum_us.fetch_add(elapsed, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        Ok(forecast)
    }
}
