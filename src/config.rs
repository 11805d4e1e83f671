//! Configuration module

use std::env;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Directory holding exported ONNX checkpoints
    pub model_dir: String,

    /// Directory holding the PeMSD7 CSV files
    pub dataset_dir: String,

    /// Number of monitored routes (sensor stations)
    pub n_route: usize,

    /// Historical window length fed to the network
    pub n_his: usize,

    /// Forecast horizon in steps
    pub n_pred: usize,

    /// Evaluation batch size
    pub batch_size: usize,

    /// Readings per day (5-minute intervals)
    pub day_slot: usize,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),

            model_dir: env::var("MODEL_DIR")
                .unwrap_or_else(|_| "./output/models".to_string()),

            dataset_dir: env::var("DATASET_DIR")
                .unwrap_or_else(|_| "./dataset/PeMSD7_Full".to_string()),

            n_route: env::var("N_ROUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(228),

            n_his: env::var("N_HIS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12),

            n_pred: env::var("N_PRED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9),

            batch_size: env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),

            day_slot: env::var("DAY_SLOT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(288),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Total window length: history plus forecast horizon
    pub fn n_frame(&self) -> usize {
        self.n_his + self.n_pred
    }

    /// Per-sensor velocity readings file
    pub fn velocity_file(&self) -> PathBuf {
        Path::new(&self.dataset_dir).join(format!("PeMSD7_V_{}.csv", self.n_route))
    }

    /// Weighted adjacency matrix file
    pub fn adjacency_file(&self) -> PathBuf {
        Path::new(&self.dataset_dir).join(format!("PeMSD7_W_{}.csv", self.n_route))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            port: 5000,
            model_dir: "./output/models".to_string(),
            dataset_dir: "/data/pems".to_string(),
            n_route: 228,
            n_his: 12,
            n_pred: 9,
            batch_size: 50,
            day_slot: 288,
            environment: "development".to_string(),
        }
    }

    #[test]
    fn frame_length_spans_history_and_horizon() {
        assert_eq!(sample().n_frame(), 21);
    }

    #[test]
    fn dataset_files_carry_route_count() {
        let config = sample();
        assert!(config
            .velocity_file()
            .ends_with("PeMSD7_V_228.csv"));
        assert!(config
            .adjacency_file()
            .ends_with("PeMSD7_W_228.csv"));
    }

    #[test]
    fn environment_flag() {
        let mut config = sample();
        assert!(!config.is_production());
        config.environment = "production".to_string();
        assert!(config.is_production());
    }
}
