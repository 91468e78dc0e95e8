use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use crate::aggregate::AggregationEngine;
use crate::collector::CollectionOrchestrator;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::Transport;
use crate::output::{ArtifactWriter, RequestDump};
use crate::parse::extract_listing;
use crate::types::{AgeBucket, ParsedListing, RequestSpec, SizeBucket, SummaryRecord};

/// Subdirectory of a run directory holding saved request bodies.
pub const REQUEST_DUMP_DIR: &str = "requests";

/// Where one dataset run left its artifacts.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub dataset: String,
    pub snapshot: PathBuf,
    pub summary_path: PathBuf,
    pub rows_path: Option<PathBuf>,
    pub summary: SummaryRecord,
}

/// Collect, persist, parse and summarize one dataset at a time.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    cfg: Config,
    engine: AggregationEngine,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, cfg: Config) -> Self {
        let engine = AggregationEngine::new(cfg.price_band);
        Self { transport, cfg, engine }
    }

    pub async fn run_dataset(&self, spec: &RequestSpec, started_at: NaiveDateTime) -> Result<RunReport> {
        info!(dataset = %spec.dataset, endpoint = %spec.endpoint, "Starting collection");

        let writer = ArtifactWriter::new(&self.cfg.output_dir, &spec.dataset, started_at);
        let transport: Arc<dyn Transport> = if self.cfg.write_request_debug {
            Arc::new(RequestDump::new(
                Arc::clone(&self.transport),
                writer.run_dir().join(REQUEST_DUMP_DIR),
            ))
        } else {
            Arc::clone(&self.transport)
        };

        let mut orchestrator =
            CollectionOrchestrator::new(transport, self.cfg.fetch.clone(), self.cfg.collect.clone());
        let outcome = orchestrator.collect(spec).await;
        info!(
            dataset = %spec.dataset,
            partitions = outcome.partitions,
            fetched = outcome.fetched_before_verification,
            verified = outcome.listings.len(),
            used_fallback = outcome.used_fallback,
            "Collection finished: {} of {} listings kept across {} partitions{}",
            outcome.listings.len(),
            outcome.fetched_before_verification,
            outcome.partitions,
            if outcome.used_fallback { " (unfiltered fallback)" } else { "" },
        );

        let snapshot = writer.write_snapshot(&outcome.listings).await?;

        let rows: Vec<ParsedListing> = outcome.listings.iter().map(extract_listing).collect();
        let summary = self.engine.summarize(&rows, outcome.bounds, started_at);
        let summary_path = writer.write_summary(&summary).await?;

        let rows_path = if self.cfg.write_parsed_rows {
            Some(writer.write_parsed_rows(&rows).await?)
        } else {
            None
        };

        log_summary(&spec.dataset, &summary);

        Ok(RunReport {
            dataset: spec.dataset.clone(),
            snapshot,
            summary_path,
            rows_path,
            summary,
        })
    }
}

fn log_summary(dataset: &str, s: &SummaryRecord) {
    info!(
        event = "SUMMARY",
        dataset = %dataset,
        total_posts = s.total_posts,
        valid = s.valid_for_averages,
        overall_avg = s.overall_avg_price_per_sqm,
        "SUMMARY | {dataset} | size {}-{} | posts: {} | valid: {} | avg/m2: {}",
        s.requested_size_min, s.requested_size_max, s.total_posts, s.valid_for_averages,
        s.overall_avg_price_per_sqm,
    );

    for age in AgeBucket::all() {
        let stats = s.age_intervals.get(&age).copied().unwrap_or_default();
        info!("  age {age:>5} yrs | avg/m2: {:>12} | n={}", stats.avg, stats.count);
    }
    for size in SizeBucket::all() {
        let stats = s.size_intervals.get(&size).copied().unwrap_or_default();
        info!("  size {size:>6} m2 | avg/m2: {:>12} | n={}", stats.avg, stats.count);
    }
    for line in matrix_lines(s) {
        info!("{line}");
    }
}

/// One line per age bucket: every size bucket's average and count.
fn matrix_lines(s: &SummaryRecord) -> Vec<String> {
    AgeBucket::all()
        .into_iter()
        .map(|age| {
            let row = s.age_size_matrix.get(&age);
            let cells: Vec<String> = SizeBucket::all()
                .into_iter()
                .map(|size| {
                    let stats = row.and_then(|r| r.get(&size)).copied().unwrap_or_default();
                    format!("{size:>6}: {:>12} (n={})", stats.avg, stats.count)
                })
                .collect();
            format!("  matrix {age:>5} yrs | {}", cells.join(" | "))
        })
        .collect()
}
