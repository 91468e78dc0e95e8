use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::config::DEFAULT_HEADERS;
use crate::error::{AppError, Result};
use crate::types::RequestSpec;

/// One entry of the datasets file, as written by hand.
#[derive(Debug, Deserialize)]
struct DatasetEntry {
    name: String,
    url: String,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    payload: Value,
}

pub async fn load_datasets(path: &Path) -> Result<Vec<RequestSpec>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Dataset(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_datasets(&text)
}

pub fn parse_datasets(text: &str) -> Result<Vec<RequestSpec>> {
    let entries: Vec<DatasetEntry> = serde_json::from_str(text)
        .map_err(|e| AppError::Dataset(format!("malformed datasets file: {e}")))?;

    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Dataset("dataset with empty name".into()));
        }
        if specs.iter().any(|s: &RequestSpec| s.dataset == name) {
            return Err(AppError::Dataset(format!("duplicate dataset name {name:?}")));
        }
        if !(entry.url.starts_with("http://") || entry.url.starts_with("https://")) {
            return Err(AppError::Dataset(format!("{name}: url must be http(s), got {:?}", entry.url)));
        }
        if !entry.payload.is_object() {
            return Err(AppError::Dataset(format!("{name}: payload must be a JSON object")));
        }

        let headers = entry.headers.unwrap_or_else(default_headers);
        specs.push(RequestSpec {
            dataset: name,
            endpoint: entry.url,
            headers,
            body: entry.payload,
        });
    }
    Ok(specs)
}

pub fn default_headers() -> BTreeMap<String, String> {
    DEFAULT_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
