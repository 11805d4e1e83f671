//! Checkpoint discovery and integrity
//!
//! Locates the newest exported checkpoint, fingerprints it, and picks up the
//! sidecar files the training pipeline leaves next to it.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::dataset::Stats;
use crate::metrics::EvalReport;

use super::InferenceError;

/// Training normalization sidecar
pub const STATS_FILE: &str = "stats.json";

/// Offline evaluation sidecar
pub const METRICS_FILE: &str = "metrics.json";

/// Newest `.onnx` checkpoint under `dir`. Export filenames carry timestamps,
/// so lexicographic order is chronological.
pub fn find_latest_checkpoint(dir: &Path) -> Result<PathBuf, InferenceError> {
    let entries = fs::read_dir(dir)
        .map_err(|source| InferenceError::Io {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "onnx"))
        .collect::<Vec<_>>();

    entries
        .into_iter()
        .max()
        .ok_or_else(|| InferenceError::NoCheckpoint(dir.display().to_string()))
}

/// SHA-256 fingerprint of the checkpoint file.
pub fn checkpoint_checksum(path: &Path) -> Result<String, InferenceError> {
    let bytes = fs::read(path).map_err(|source| InferenceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Z-score parameters exported by the training pipeline, if present.
/// A malformed sidecar is ignored rather than blocking the load.
pub fn load_training_stats(dir: &Path) -> Option<Stats> {
    let path = dir.join(STATS_FILE);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Last persisted offline evaluation, if any.
pub fn load_eval_report(dir: &Path) -> Option<EvalReport> {
    let path = dir.join(METRICS_FILE);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist an offline evaluation next to the checkpoint.
pub fn save_eval_report(dir: &Path, report: &EvalReport) -> Result<(), InferenceError> {
    let path = dir.join(METRICS_FILE);
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| InferenceError::Report(e.to_string()))?;
    fs::write(&path, json).map_err(|source| InferenceError::Io {
        path: path.display().to_string(),
        source,
    })
}
