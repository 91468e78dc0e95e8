pub mod decoder;
pub mod paginator;
pub mod transport;

pub use paginator::PaginatedFetcher;
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::Transport;
    use crate::config::{FetchSettings, PaginationKeys};
    use crate::error::{AppError, Result};

    pub fn fast_settings(page_size_guess: usize) -> FetchSettings {
        FetchSettings {
            page_size_guess,
            rate_limit: Duration::ZERO,
            max_pages: 50,
            keys: PaginationKeys::default(),
        }
    }

    fn script_exhausted(url: &str) -> AppError {
        AppError::Status { status: 503, url: url.to_string() }
    }

    /// Replays canned responses in order; fails once the script runs out.
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value>>>,
        requests: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<Result<Value>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<Value> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(
            &self,
            url: &str,
            _headers: &BTreeMap<String, String>,
            body: &Value,
        ) -> Result<Value> {
            self.requests.lock().unwrap().push(body.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(script_exhausted(url)))
        }
    }

    /// Answers each request by calling `respond` on the request body.
    pub struct FnTransport<F> {
        respond: F,
        requests: Mutex<Vec<Value>>,
    }

    impl<F> FnTransport<F>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync,
    {
        pub fn new(respond: F) -> Self {
            Self { respond, requests: Mutex::new(Vec::new()) }
        }

        pub fn requests(&self) -> Vec<Value> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<F> Transport for FnTransport<F>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync,
    {
        async fn post_json(
            &self,
            _url: &str,
            _headers: &BTreeMap<String, String>,
            body: &Value,
        ) -> Result<Value> {
            self.requests.lock().unwrap().push(body.clone());
            (self.respond)(body)
        }
    }
}
