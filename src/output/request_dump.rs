use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetcher::Transport;
use crate::output::writer::write_pretty_json;

/// Saves every outgoing request body as `request_payload_debug_page<N>.json`
/// before handing it to the wrapped transport. `N` counts requests across
/// all partitions of a run, starting at 1.
pub struct RequestDump {
    inner: Arc<dyn Transport>,
    dir: PathBuf,
    seq: AtomicUsize,
}

impl RequestDump {
    pub fn new(inner: Arc<dyn Transport>, dir: PathBuf) -> Self {
        Self { inner, dir, seq: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Transport for RequestDump {
    async fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let path = self.dir.join(format!("request_payload_debug_page{n}.json"));
        // A failed dump never blocks the request itself.
        match write_pretty_json(&path, body).await {
            Ok(bytes) => debug!(path = %path.display(), bytes, "Saved request payload"),
            Err(e) => warn!(path = %path.display(), "Could not save request payload: {e}"),
        }
        self.inner.post_json(url, headers, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedTransport;
    use serde_json::json;

    #[tokio::test]
    async fn every_request_is_saved_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": [], "cursor": "c1"})),
            Ok(json!({"posts": []})),
        ]));
        let dump = RequestDump::new(inner.clone(), dir.path().join("requests"));

        let first = dump.post_json("http://x", &BTreeMap::new(), &json!({"page": 1})).await.unwrap();
        dump.post_json("http://x", &BTreeMap::new(), &json!({"page": 2, "q": "آپارتمان"}))
            .await
            .unwrap();

        assert_eq!(first["cursor"], "c1");
        assert_eq!(inner.requests().len(), 2);

        let saved = |n: usize| -> Value {
            let path = dir.path().join("requests").join(format!("request_payload_debug_page{n}.json"));
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
        };
        assert_eq!(saved(1), json!({"page": 1}));
        assert_eq!(saved(2)["q"], "آپارتمان");
    }

    #[tokio::test]
    async fn unwritable_dir_still_sends_request() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let inner = Arc::new(ScriptedTransport::new(vec![Ok(json!({"posts": [{"id": "a"}]}))]));
        let dump = RequestDump::new(inner.clone(), blocker.join("requests"));

        let resp = dump.post_json("http://x", &BTreeMap::new(), &json!({})).await.unwrap();
        assert_eq!(resp["posts"][0]["id"], "a");
        assert_eq!(inner.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let dump = RequestDump::new(Arc::new(ScriptedTransport::new(Vec::new())), dir.path().to_path_buf());

        assert!(dump.post_json("http://x", &BTreeMap::new(), &json!({})).await.is_err());
        assert!(dir.path().join("request_payload_debug_page1.json").exists());
    }
}
