//! Offline model evaluation
//!
//! Scores the exported checkpoint against the held-out test split and
//! persists the result next to the checkpoint for the API's confidence
//! reporting.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use ndarray::{s, Array2, Axis};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stgcn_server::config::Config;
use stgcn_server::dataset::{data_gen, Split};
use stgcn_server::graph::{
    cheb_poly_approx, scaled_laplacian, weight_matrix, DEFAULT_EPSILON, DEFAULT_SIGMA2,
};
use stgcn_server::metrics::{evaluate_step, EvalReport};
use stgcn_server::model::{checkpoint, ForecastEngine};

/// Chebyshev kernel order the checkpoint was trained with
const KS: usize = 3;

/// Day split the dataset was trained with: 34 train / 5 val / 5 test
const EVAL_SPLITS: (usize, usize, usize) = (34, 5, 5);

const DEFAULT_SAMPLES: usize = 10;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stgcn_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let samples: usize = std::env::var("EVAL_SAMPLES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SAMPLES);

    // Rebuild the graph kernel to validate the adjacency configuration the
    // checkpoint was exported with; the exported network embeds its own copy.
    let w = weight_matrix(&config.adjacency_file(), DEFAULT_SIGMA2, DEFAULT_EPSILON, true)
        .context("loading adjacency matrix")?;
    let laplacian = scaled_laplacian(&w);
    let kernel = cheb_poly_approx(&laplacian, KS).context("building graph kernel")?;
    tracing::info!(
        "Graph kernel: {} x {} (Ks = {})",
        kernel.nrows(),
        kernel.ncols(),
        KS
    );

    let dataset = data_gen(
        &config.velocity_file(),
        EVAL_SPLITS,
        config.n_route,
        config.n_frame(),
        config.day_slot,
    )
    .context("loading dataset")?;
    let stats = dataset.stats();
    tracing::info!(
        "Loaded dataset with mean: {:.2}, std: {:.2}",
        stats.mean,
        stats.std
    );

    let engine = ForecastEngine::new(config.n_his, config.n_pred, config.n_route);
    engine
        .load(Path::new(&config.model_dir))
        .context("loading checkpoint")?;
    engine.set_stats(stats);

    let test = dataset.get(Split::Test);
    let n = samples.min(test.len_of(Axis(0)));
    ensure!(n > 0, "test split is empty");
    tracing::info!("Evaluating {} test windows...", n);

    let step_idx = config.n_pred - 1;
    let frames = config.n_his + 1;

    let mut truth = Array2::<f64>::zeros((n, config.n_route));
    let mut pred = Array2::<f64>::zeros((n, config.n_route));

    for i in 0..n {
        let window = test.slice(s![i, 0..frames, .., 0]).to_owned();
        let forecast = engine.predict(&window)?;
        for r in 0..config.n_route {
            pred[(i, r)] = forecast[(step_idx, r)];
            truth[(i, r)] = test[(i, step_idx + config.n_his, r, 0)];
        }
    }

    let metrics = evaluate_step(&truth.view().into_dyn(), &pred.view().into_dyn(), stats)?;

    println!();
    println!("{}", "=".repeat(60));
    println!("MODEL PERFORMANCE METRICS");
    println!("{}", "=".repeat(60));
    println!(
        "Mean Absolute Percentage Error (MAPE): {:7.3}%",
        metrics.mape * 100.0
    );
    println!("Mean Absolute Error (MAE):           {:4.3}", metrics.mae);
    println!("Root Mean Squared Error (RMSE):      {:6.3}", metrics.rmse);
    println!("{}", "=".repeat(60));

    let accuracy = (1.0 - metrics.mape) * 100.0;
    println!();
    println!("Model Accuracy (100 - MAPE): {:.2}%", accuracy);
    println!("{}", "=".repeat(60));

    let report = EvalReport {
        step: config.n_pred,
        samples: n,
        mape: metrics.mape,
        mae: metrics.mae,
        rmse: metrics.rmse,
        evaluated_at: chrono::Utc::now(),
    };
    checkpoint::save_eval_report(Path::new(&config.model_dir), &report)
        .context("persisting evaluation report")?;
    tracing::info!("Evaluation report written to {}/metrics.json", config.model_dir);

    Ok(())
}
