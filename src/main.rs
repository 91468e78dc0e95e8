mod aggregate;
mod collector;
mod config;
mod datasets;
mod error;
mod fetcher;
mod json_walk;
mod output;
mod parse;
mod pipeline;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::datasets::load_datasets;
use crate::error::Result;
use crate::fetcher::HttpTransport;
use crate::pipeline::Pipeline;
use crate::types::RequestSpec;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let specs = load_datasets(&cfg.datasets_path).await?;
    info!(
        "Loaded {} datasets from {} (output: {}, step: {}, price band: {}-{})",
        specs.len(),
        cfg.datasets_path.display(),
        cfg.output_dir.display(),
        cfg.collect.size_step,
        cfg.price_band.floor,
        cfg.price_band.ceiling,
    );

    let transport = Arc::new(HttpTransport::new(cfg.request_timeout)?);
    let run_interval = cfg.run_interval;
    let pipeline = Pipeline::new(transport, cfg);

    let Some(period) = run_interval else {
        run_all(&pipeline, &specs).await;
        return Ok(());
    };

    info!("Repeating every {}s", period.as_secs());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        run_all(&pipeline, &specs).await;
    }
}

/// One pass over every dataset. A failing dataset does not stop the others.
async fn run_all(pipeline: &Pipeline, specs: &[RequestSpec]) {
    let started_at = chrono::Local::now().naive_local();
    let mut failed = 0usize;

    for spec in specs {
        match pipeline.run_dataset(spec, started_at).await {
            Ok(report) => info!(
                dataset = %report.dataset,
                posts = report.summary.total_posts,
                snapshot = %report.snapshot.display(),
                summary = %report.summary_path.display(),
                rows = ?report.rows_path,
                "Dataset done"
            ),
            Err(e) => {
                failed += 1;
                error!(dataset = %spec.dataset, "Dataset failed: {e}");
            }
        }
    }

    info!(
        datasets = specs.len(),
        failed,
        "Run complete: {}/{} datasets succeeded",
        specs.len() - failed,
        specs.len(),
    );
}
