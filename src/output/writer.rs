use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::types::{CollectedSet, ParsedListing, SummaryRecord};

/// Format of the `<ts>` component in run directories and file names.
pub const RUN_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes the artifacts of one dataset run under `<root>/<dataset>/<ts>/`.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    run_dir: PathBuf,
    stamp: String,
}

impl ArtifactWriter {
    pub fn new(root: &Path, dataset: &str, started_at: NaiveDateTime) -> Self {
        let stamp = started_at.format(RUN_STAMP_FORMAT).to_string();
        let run_dir = root.join(dir_name(dataset)).join(&stamp);
        Self { run_dir, stamp }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Verified listings, in collection order.
    pub async fn write_snapshot(&self, listings: &CollectedSet) -> Result<PathBuf> {
        self.write_json("posts_collected", listings).await
    }

    pub async fn write_summary(&self, summary: &SummaryRecord) -> Result<PathBuf> {
        self.write_json("summary", summary).await
    }

    pub async fn write_parsed_rows(&self, rows: &[ParsedListing]) -> Result<PathBuf> {
        self.write_json("rows_parsed", rows).await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, prefix: &str, value: &T) -> Result<PathBuf> {
        let path = self.run_dir.join(format!("{prefix}_{}.json", self.stamp));
        let bytes = write_pretty_json(&path, value).await?;
        info!(path = %path.display(), bytes, "Wrote {prefix} artifact");
        Ok(path)
    }
}

/// Pretty-printed UTF-8 JSON, creating parent directories as needed.
/// Returns the number of bytes written.
pub(crate) async fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<usize> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, &bytes).await?;
    Ok(bytes.len())
}

/// Dataset names become a single path component.
fn dir_name(dataset: &str) -> String {
    let cleaned: String = dataset
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "dataset".to_string(),
        _ => cleaned,
    }
}
