use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::FetchSettings;
use crate::fetcher::decoder::{Cursor, ResponsePageDecoder};
use crate::fetcher::transport::Transport;
use crate::types::CollectedSet;

/// States of one paginated fetch.
#[derive(Debug)]
enum FetchState {
    Requesting,
    Merging(Value),
    Advancing { page_len: usize, cursor: Option<Cursor> },
    Exhausted(StopReason),
}

/// Why a paginated fetch ended. All of these are normal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Request, status, or decode failure; whatever was merged so far is kept.
    TransportFailure,
    /// Fewer records than a full page and no cursor.
    ShortPage,
    /// Full page, but no cursor and the body has no page/offset field.
    NoAdvancement,
    /// Page-style advancement reached a page with no records.
    EmptyPage,
    /// The server handed back the cursor it was just sent.
    RepeatedCursor,
    /// `max_pages` requests were issued.
    PageLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::TransportFailure => "transport_failure",
            StopReason::ShortPage => "short_page",
            StopReason::NoAdvancement => "no_advancement",
            StopReason::EmptyPage => "empty_page",
            StopReason::RepeatedCursor => "repeated_cursor",
            StopReason::PageLimit => "page_limit",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct FetchReport {
    pub listings: CollectedSet,
    pub pages: u32,
    pub stop: StopReason,
}

/// Mutable state of one fetch: the working body copy and its counters.
struct Walk {
    body: Value,
    /// First page-style field present in the body, if any.
    page_key: Option<String>,
    page: u32,
    requests: u32,
    sent_cursor: Option<Cursor>,
}

impl Walk {
    fn new(body: Value, page_keys: &[String]) -> Self {
        let page_key = page_keys.iter().find(|k| body.get(k.as_str()).is_some()).cloned();
        Self { body, page_key, page: 1, requests: 0, sent_cursor: None }
    }
}

/// Walks the upstream pages for one request body, one request at a time,
/// deduplicating records as they arrive.
///
/// The same fetcher is reused across size partitions so the rate limit
/// holds between the last page of one partition and the first of the next.
pub struct PaginatedFetcher {
    transport: Arc<dyn Transport>,
    decoder: ResponsePageDecoder,
    settings: FetchSettings,
    last_request: Option<Instant>,
}

impl PaginatedFetcher {
    pub fn new(transport: Arc<dyn Transport>, settings: FetchSettings) -> Self {
        Self {
            transport,
            decoder: ResponsePageDecoder::new(settings.keys.clone()),
            settings,
            last_request: None,
        }
    }

    pub async fn fetch(
        &mut self,
        endpoint: &str,
        headers: &BTreeMap<String, String>,
        base_body: &Value,
    ) -> FetchReport {
        let mut walk = Walk::new(base_body.clone(), &self.settings.keys.page_keys);
        let mut listings = CollectedSet::new();
        let mut state = FetchState::Requesting;

        let stop = loop {
            state = match state {
                FetchState::Requesting => {
                    if let Some(key) = &walk.page_key {
                        self.set_page(&mut walk.body, key, walk.page);
                    }
                    self.throttle().await;
                    walk.requests += 1;
                    match self.transport.post_json(endpoint, headers, &walk.body).await {
                        Ok(resp) => FetchState::Merging(resp),
                        Err(e) => {
                            warn!(page = walk.page, "Error fetching page, keeping {} records: {e}", listings.len());
                            FetchState::Exhausted(StopReason::TransportFailure)
                        }
                    }
                }
                FetchState::Merging(resp) => {
                    let records = self.decoder.extract_records(&resp);
                    let page_len = records.len();
                    let added = listings.extend(records);
                    let cursor = self.decoder.extract_cursor(&resp);
                    debug!(
                        page = walk.page,
                        page_len,
                        added,
                        total = listings.len(),
                        cursor = ?cursor,
                        "Merged page"
                    );
                    FetchState::Advancing { page_len, cursor }
                }
                FetchState::Advancing { page_len, cursor } => self.advance(&mut walk, page_len, cursor),
                FetchState::Exhausted(reason) => break reason,
            };
        };

        debug!(pages = walk.requests, records = listings.len(), stop = %stop, "Paginated fetch finished");
        FetchReport { listings, pages: walk.requests, stop }
    }

    fn advance(&self, walk: &mut Walk, page_len: usize, cursor: Option<Cursor>) -> FetchState {
        if page_len < self.settings.page_size_guess && cursor.is_none() {
            return FetchState::Exhausted(StopReason::ShortPage);
        }
        if walk.requests >= self.settings.max_pages {
            warn!(requests = walk.requests, "Page limit reached, stopping pagination");
            return FetchState::Exhausted(StopReason::PageLimit);
        }

        match cursor {
            Some(cursor) => {
                if walk.sent_cursor.as_ref() == Some(&cursor) {
                    warn!(cursor = %cursor, "Upstream repeated the cursor, stopping pagination");
                    return FetchState::Exhausted(StopReason::RepeatedCursor);
                }
                if let Some(obj) = walk.body.as_object_mut() {
                    for key in &self.settings.keys.cursor_write_keys {
                        obj.insert(key.clone(), cursor.0.clone());
                    }
                }
                walk.sent_cursor = Some(cursor);
                walk.page += 1;
                FetchState::Requesting
            }
            None if walk.page_key.is_some() => {
                if page_len == 0 {
                    return FetchState::Exhausted(StopReason::EmptyPage);
                }
                walk.page += 1;
                FetchState::Requesting
            }
            None => FetchState::Exhausted(StopReason::NoAdvancement),
        }
    }

    /// `offset` counts records; every other page field counts pages from 1.
    fn set_page(&self, body: &mut Value, key: &str, page: u32) {
        let value = if key == "offset" {
            json!((page as usize - 1) * self.settings.page_size_guess)
        } else {
            json!(page)
        };
        if let Some(obj) = body.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.settings.rate_limit {
                sleep(self.settings.rate_limit - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetcher::testing::{fast_settings, ScriptedTransport};
    use serde_json::json;

    fn page_of(ids: std::ops::Range<u32>) -> Vec<Value> {
        ids.map(|i| json!({"id": format!("p{i}")})).collect()
    }

    #[tokio::test]
    async fn follows_cursor_until_short_page() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": page_of(0..3), "next_cursor": "c1"})),
            Ok(json!({"posts": page_of(3..5)})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), fast_settings(3));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({"q": 1})).await;

        assert_eq!(report.stop, StopReason::ShortPage);
        assert_eq!(report.pages, 2);
        assert_eq!(report.listings.len(), 5);
        let sent = transport.requests();
        assert!(sent[0].get("cursor").is_none());
        for key in ["cursor", "next_cursor", "continuation", "last_token"] {
            assert_eq!(sent[1][key], "c1");
        }
    }

    #[tokio::test]
    async fn duplicates_across_pages_are_dropped() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": [{"id": "a"}, {"id": "b"}], "cursor": "c1"})),
            Ok(json!({"posts": [{"id": "b"}, {"id": "c"}]})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport, fast_settings(10));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        let ids: Vec<&str> = report.listings.iter().filter_map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn transport_failure_keeps_partial_result() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": page_of(0..2), "cursor": "c1"})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport, fast_settings(2));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        assert_eq!(report.stop, StopReason::TransportFailure);
        assert_eq!(report.listings.len(), 2);
    }

    #[tokio::test]
    async fn page_field_is_advanced_without_cursor() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"items": page_of(0..2)})),
            Ok(json!({"items": page_of(2..4)})),
            Ok(json!({"items": page_of(4..5)})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), fast_settings(2));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({"page": 7})).await;
        assert_eq!(report.stop, StopReason::ShortPage);
        assert_eq!(report.listings.len(), 5);
        let pages: Vec<i64> = transport.requests().iter().filter_map(|b| b["page"].as_i64()).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn offset_counts_records() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"items": page_of(0..2)})),
            Ok(json!({"items": []})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), fast_settings(2));

        fetcher.fetch("http://x", &BTreeMap::new(), &json!({"offset": 0})).await;
        let offsets: Vec<i64> = transport.requests().iter().filter_map(|b| b["offset"].as_i64()).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[tokio::test]
    async fn full_page_without_any_advancement_stops() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(json!({"posts": page_of(0..2)}))]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), fast_settings(2));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        assert_eq!(report.stop, StopReason::NoAdvancement);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn repeated_cursor_stops() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": page_of(0..1), "cursor": "same"})),
            Ok(json!({"posts": page_of(1..2), "cursor": "same"})),
            Ok(json!({"posts": page_of(2..3), "cursor": "same"})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), fast_settings(10));

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        assert_eq!(report.stop, StopReason::RepeatedCursor);
        assert_eq!(report.listings.len(), 2);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn page_limit_bounds_the_loop() {
        let responses = (0..10)
            .map(|i| Ok(json!({"posts": page_of(i..i + 1), "cursor": format!("c{i}")})))
            .collect();
        let transport = Arc::new(ScriptedTransport::new(responses));
        let mut settings = fast_settings(1);
        settings.max_pages = 3;
        let mut fetcher = PaginatedFetcher::new(transport.clone(), settings);

        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        assert_eq!(report.stop, StopReason::PageLimit);
        assert_eq!(report.pages, 3);
    }

    #[tokio::test]
    async fn base_body_is_not_mutated() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": page_of(0..1), "cursor": "c1"})),
            Ok(json!({"posts": []})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport, fast_settings(1));
        let base = json!({"page": 1, "filters": {"a": 1}});

        fetcher.fetch("http://x", &BTreeMap::new(), &base).await;
        assert_eq!(base, json!({"page": 1, "filters": {"a": 1}}));
    }

    fn paced(rate_limit_ms: u64, page_size_guess: usize) -> FetchSettings {
        FetchSettings {
            rate_limit: std::time::Duration::from_millis(rate_limit_ms),
            ..fast_settings(page_size_guess)
        }
    }

    #[tokio::test]
    async fn consecutive_pages_wait_out_the_rate_limit() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"posts": page_of(0..2), "cursor": "c1"})),
            Ok(json!({"posts": page_of(2..4), "cursor": "c2"})),
            Ok(json!({"posts": page_of(4..5)})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport, paced(120, 2));

        let started = Instant::now();
        let report = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        let elapsed = started.elapsed();

        assert_eq!(report.pages, 3);
        assert_eq!(report.stop, StopReason::ShortPage);
        assert!(elapsed.as_millis() >= 240, "three requests took only {elapsed:?}");
    }

    #[tokio::test]
    async fn rate_limit_holds_across_fetches_after_a_failure() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(AppError::Status { status: 500, url: "http://x".into() }),
            Ok(json!({"posts": page_of(0..1)})),
        ]));
        let mut fetcher = PaginatedFetcher::new(transport.clone(), paced(120, 10));

        let started = Instant::now();
        let failed = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        let next = fetcher.fetch("http://x", &BTreeMap::new(), &json!({})).await;
        let elapsed = started.elapsed();

        assert_eq!(failed.stop, StopReason::TransportFailure);
        assert_eq!(next.stop, StopReason::ShortPage);
        assert_eq!(next.listings.len(), 1);
        assert_eq!(transport.requests().len(), 2);
        assert!(elapsed.as_millis() >= 120, "second request was not delayed: {elapsed:?}");
    }
}
