use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::collector::partition::partition;
use crate::config::{CollectSettings, FetchSettings};
use crate::fetcher::{PaginatedFetcher, Transport};
use crate::json_walk::{find_all, find_first, get_path, set_at_first_existing_path, JsonPath};
use crate::parse::record::{card_of, extract_size};
use crate::types::{CollectedSet, RequestSpec, SizeInterval};

const SIZE_KEY: &str = "size";
const NUMBER_RANGE_KEY: &str = "number_range";

#[derive(Debug)]
pub struct CollectionOutcome {
    /// Listings whose parsed size lies inside `bounds`.
    pub listings: CollectedSet,
    /// The size range actually requested.
    pub bounds: SizeInterval,
    pub partitions: usize,
    /// Unique listings before client-side size verification.
    pub fetched_before_verification: usize,
    pub used_fallback: bool,
}

/// Drives one partitioned collection run for a dataset.
pub struct CollectionOrchestrator {
    fetcher: PaginatedFetcher,
    settings: CollectSettings,
}

impl CollectionOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, fetch: FetchSettings, settings: CollectSettings) -> Self {
        Self { fetcher: PaginatedFetcher::new(transport, fetch), settings }
    }

    pub async fn collect(&mut self, spec: &RequestSpec) -> CollectionOutcome {
        let dataset = spec.dataset.as_str();
        let base = &spec.body;

        let discovered = find_size_range(base);
        let bounds = match &discovered {
            Some((_, range)) => *range,
            None => {
                info!(dataset, "No size constraint in request body, using default {}", self.settings.default_range);
                self.settings.default_range
            }
        };

        let constraint_count = find_all(base, |n| size_range_of(n).is_some()).len();
        if constraint_count > 1 {
            warn!(
                dataset,
                locations = constraint_count,
                "Request body has several size constraints; only the first one found is partitioned"
            );
        }

        let candidates: Vec<JsonPath> = discovered
            .map(|(path, _)| path)
            .into_iter()
            .chain(self.settings.size_container_paths.iter().map(|p| JsonPath::from_keys(p)))
            .collect();

        let intervals = partition(bounds.min, bounds.max, self.settings.size_step);
        info!(
            dataset,
            min = bounds.min,
            max = bounds.max,
            partitions = intervals.len(),
            "Using requested size range {bounds}"
        );

        let mut collected = CollectedSet::new();
        let mut injection_warned = false;

        for interval in &intervals {
            let (body, target) = inject_size_range(base, *interval, &candidates);
            if target.is_none() && !injection_warned {
                warn!(dataset, "No container for a size constraint in request body; sending it unfiltered");
                injection_warned = true;
            }

            let report = self.fetcher.fetch(&spec.endpoint, &spec.headers, &body).await;
            let fetched = report.listings.len();
            let added = collected.merge(report.listings);
            info!(
                dataset,
                interval = %interval,
                pages = report.pages,
                fetched,
                added,
                total = collected.len(),
                stop = %report.stop,
                "Fetched size partition"
            );
        }

        let mut used_fallback = false;
        if collected.is_empty() {
            warn!(dataset, "No listings collected per size range, falling back to one unfiltered paginated fetch");
            let report = self.fetcher.fetch(&spec.endpoint, &spec.headers, base).await;
            let added = collected.merge(report.listings);
            info!(dataset, pages = report.pages, added, stop = %report.stop, "Unfiltered fallback fetch finished");
            used_fallback = true;
        }

        let fetched_before_verification = collected.len();
        let listings = verify_sizes(&collected, bounds);
        info!(
            dataset,
            before = fetched_before_verification,
            after = listings.len(),
            "Client-side size filter kept {} of {} listings in {bounds}",
            listings.len(),
            fetched_before_verification,
        );

        CollectionOutcome {
            listings,
            bounds,
            partitions: intervals.len(),
            fetched_before_verification,
            used_fallback,
        }
    }
}

/// Keeps listings whose size could be parsed and lies inside `bounds`.
/// The upstream does not reliably honor the injected constraint.
pub fn verify_sizes(collected: &CollectedSet, bounds: SizeInterval) -> CollectedSet {
    collected.filtered(|record| extract_size(card_of(record)).is_some_and(|s| bounds.contains(s)))
}

/// First object (depth-first) carrying `size.number_range.{minimum,maximum}`,
/// returned with the path of that object.
pub fn find_size_range(body: &Value) -> Option<(JsonPath, SizeInterval)> {
    let (path, node) = find_first(body, |n| size_range_of(n).is_some())?;
    Some((path, size_range_of(node)?))
}

fn size_range_of(node: &Value) -> Option<SizeInterval> {
    let range = node.get(SIZE_KEY)?.get(NUMBER_RANGE_KEY)?;
    let min = parse_bound(range.get("minimum")?)?;
    let max = parse_bound(range.get("maximum")?)?;
    (min <= max).then(|| SizeInterval::new(min, max))
}

/// Bounds arrive as strings ("60") but integers are accepted too.
fn parse_bound(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Deep copy of `base` with `interval` written as `size.number_range` into
/// the first existing candidate container. Other keys under `size` and
/// `number_range` are kept. Returns the container used, if any.
pub fn inject_size_range(
    base: &Value,
    interval: SizeInterval,
    candidates: &[JsonPath],
) -> (Value, Option<JsonPath>) {
    let mut body = base.clone();
    let Some(target) = candidates
        .iter()
        .find(|p| get_path(&body, p).is_some_and(Value::is_object))
    else {
        return (body, None);
    };

    let mut size = get_path(&body, target)
        .and_then(|c| c.get(SIZE_KEY))
        .filter(|s| s.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    if !size.get(NUMBER_RANGE_KEY).is_some_and(Value::is_object) {
        size[NUMBER_RANGE_KEY] = json!({});
    }
    size[NUMBER_RANGE_KEY]["minimum"] = json!(interval.min.to_string());
    size[NUMBER_RANGE_KEY]["maximum"] = json!(interval.max.to_string());

    let used = set_at_first_existing_path(&mut body, std::slice::from_ref(target), SIZE_KEY, size);
    (body, used)
}
