use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::SizeInterval;

/// Price-per-sqm plausibility band (inclusive). Values outside are kept in
/// `total_posts` but never enter an average.
pub const PRICE_FLOOR: i64 = 50_000_000;
pub const PRICE_CEILING: i64 = 300_000_000;

/// Per-request timeout (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A page with fewer records than this and no cursor is treated as the last one.
pub const PAGE_SIZE_GUESS: usize = 200;

/// Minimum gap between two consecutive upstream requests (milliseconds).
pub const RATE_LIMIT_MS: u64 = 120;

/// Hard stop for a single paginated fetch.
pub const MAX_PAGES: u32 = 100;

/// Width of each size partition (sqm).
pub const SIZE_STEP: i64 = 5;

/// Used when the request body carries no size constraint of its own.
pub const DEFAULT_SIZE_MIN: i64 = 75;
pub const DEFAULT_SIZE_MAX: i64 = 120;

/// Headers sent when a dataset does not define its own.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    ),
    ("Content-Type", "application/json; charset=utf-8"),
    ("Accept", "application/json, text/plain, */*"),
    ("X-Requested-With", "XMLHttpRequest"),
    ("Accept-Language", "fa-IR,fa;q=0.9,en-US;q=0.8,en;q=0.7"),
];

/// Key names the upstream has been observed to use. None of them are
/// contractual, so every list stays overridable.
pub mod keys {
    pub const RECORD_KEYS: &[&str] = &["posts", "widget_list", "items", "data"];
    pub const CURSOR_KEYS: &[&str] = &[
        "next_cursor",
        "next",
        "cursor",
        "nextPage",
        "next_page",
        "continuation",
        "last_token",
    ];
    pub const CURSOR_SUBKEYS: &[&str] = &["cursor", "token", "last_token"];
    pub const META_CONTAINERS: &[&str] = &["meta", "paging", "pagination"];
    pub const META_CURSOR_KEYS: &[&str] =
        &["next_cursor", "next", "cursor", "next_page", "nextPage"];
    /// Body fields a discovered cursor is written back into.
    pub const CURSOR_WRITE_KEYS: &[&str] = &["cursor", "next_cursor", "continuation", "last_token"];
    /// Body fields that enable page-style advancement, in priority order.
    pub const PAGE_KEYS: &[&str] = &["page", "page_number", "page_num", "offset"];
    /// Where the size constraint lives when the body does not already carry one.
    pub const SIZE_CONTAINER_PATH: &[&str] = &["search_data", "form_data", "data"];
}

/// Candidate key names used by the page decoder and the fetcher.
#[derive(Debug, Clone)]
pub struct PaginationKeys {
    pub record_keys: Vec<String>,
    pub cursor_keys: Vec<String>,
    pub cursor_subkeys: Vec<String>,
    pub meta_containers: Vec<String>,
    pub meta_cursor_keys: Vec<String>,
    pub cursor_write_keys: Vec<String>,
    pub page_keys: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for PaginationKeys {
    fn default() -> Self {
        Self {
            record_keys: owned(keys::RECORD_KEYS),
            cursor_keys: owned(keys::CURSOR_KEYS),
            cursor_subkeys: owned(keys::CURSOR_SUBKEYS),
            meta_containers: owned(keys::META_CONTAINERS),
            meta_cursor_keys: owned(keys::META_CURSOR_KEYS),
            cursor_write_keys: owned(keys::CURSOR_WRITE_KEYS),
            page_keys: owned(keys::PAGE_KEYS),
        }
    }
}

/// Settings threaded into `PaginatedFetcher`.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_size_guess: usize,
    pub rate_limit: Duration,
    pub max_pages: u32,
    pub keys: PaginationKeys,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size_guess: PAGE_SIZE_GUESS,
            rate_limit: Duration::from_millis(RATE_LIMIT_MS),
            max_pages: MAX_PAGES,
            keys: PaginationKeys::default(),
        }
    }
}

/// Settings threaded into `CollectionOrchestrator`.
#[derive(Debug, Clone)]
pub struct CollectSettings {
    pub size_step: i64,
    pub default_range: SizeInterval,
    /// Containers tried, in order, when injecting a size constraint.
    pub size_container_paths: Vec<Vec<String>>,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            size_step: SIZE_STEP,
            default_range: SizeInterval::new(DEFAULT_SIZE_MIN, DEFAULT_SIZE_MAX),
            size_container_paths: vec![owned(keys::SIZE_CONTAINER_PATH)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBand {
    pub floor: i64,
    pub ceiling: i64,
}

impl PriceBand {
    pub fn contains(&self, price: i64) -> bool {
        self.floor <= price && price <= self.ceiling
    }
}

impl Default for PriceBand {
    fn default() -> Self {
        Self { floor: PRICE_FLOOR, ceiling: PRICE_CEILING }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// JSON file listing the datasets to collect (DATASETS_PATH)
    pub datasets_path: PathBuf,
    /// Root of the per-dataset artifact tree (OUTPUT_DIR)
    pub output_dir: PathBuf,
    pub request_timeout: Duration,
    pub fetch: FetchSettings,
    pub collect: CollectSettings,
    pub price_band: PriceBand,
    /// Also write the per-listing parsed rows next to the summary (WRITE_PARSED_ROWS)
    pub write_parsed_rows: bool,
    /// Save every outgoing request body under `<run dir>/requests/` (WRITE_REQUEST_DEBUG)
    pub write_request_debug: bool,
    /// Repeat the whole run on this period; a single pass when unset (RUN_INTERVAL_SECS)
    pub run_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_min = env_parse::<i64>("DEFAULT_SIZE_MIN", DEFAULT_SIZE_MIN)?;
        let default_max = env_parse::<i64>("DEFAULT_SIZE_MAX", DEFAULT_SIZE_MAX)?;
        if default_min > default_max {
            return Err(AppError::Config(format!(
                "DEFAULT_SIZE_MIN ({default_min}) must not exceed DEFAULT_SIZE_MAX ({default_max})"
            )));
        }

        let size_step = env_parse::<i64>("SIZE_STEP", SIZE_STEP)?;
        if size_step < 1 {
            return Err(AppError::Config("SIZE_STEP must be at least 1".to_string()));
        }

        let price_band = PriceBand {
            floor: env_parse("PRICE_FLOOR", PRICE_FLOOR)?,
            ceiling: env_parse("PRICE_CEILING", PRICE_CEILING)?,
        };
        if price_band.floor > price_band.ceiling {
            return Err(AppError::Config(
                "PRICE_FLOOR must not exceed PRICE_CEILING".to_string(),
            ));
        }

        let run_interval = match std::env::var("RUN_INTERVAL_SECS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    AppError::Config("RUN_INTERVAL_SECS must be a whole number of seconds".to_string())
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            datasets_path: std::env::var("DATASETS_PATH")
                .unwrap_or_else(|_| "datasets.json".to_string())
                .into(),
            output_dir: std::env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "results".to_string())
                .into(),
            request_timeout: Duration::from_secs(env_parse(
                "REQUEST_TIMEOUT_SECS",
                REQUEST_TIMEOUT_SECS,
            )?),
            fetch: FetchSettings {
                page_size_guess: env_parse("PAGE_SIZE_GUESS", PAGE_SIZE_GUESS)?,
                rate_limit: Duration::from_millis(env_parse("RATE_LIMIT_MS", RATE_LIMIT_MS)?),
                max_pages: env_parse("MAX_PAGES", MAX_PAGES)?,
                keys: PaginationKeys::default(),
            },
            collect: CollectSettings {
                size_step,
                default_range: SizeInterval::new(default_min, default_max),
                ..CollectSettings::default()
            },
            price_band,
            write_parsed_rows: env_flag("WRITE_PARSED_ROWS"),
            write_request_debug: env_flag("WRITE_REQUEST_DEBUG"),
            run_interval,
        })
    }
}

/// `1`, `true` or `yes` (any case) turn a flag on; anything else, or unset, is off.
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}
