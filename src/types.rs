use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Upstream listing record. No fixed schema; treat as opaque.
pub type RawListing = Value;

/// Key under which the upstream nests the display card of a listing.
pub const CARD_KEY: &str = "map_post_card";

/// Explicit identifier fields, in lookup order.
const IDENTITY_KEYS: &[&str] = &["id", "token", "post_token", "postId"];

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One logical dataset: where to POST, with which headers and body.
/// Never mutated; every derived body is a clone of `body`.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub dataset: String,
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

// ---------------------------------------------------------------------------
// Size intervals
// ---------------------------------------------------------------------------

/// Inclusive square-meter range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeInterval {
    pub min: i64,
    pub max: i64,
}

impl SizeInterval {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: i64) -> bool {
        self.min <= size && size <= self.max
    }
}

impl std::fmt::Display for SizeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Deduplication key. `Content` is only used when the record carries no
/// explicit id, so an id can never collide with a serialized record.
/// Numeric ids stay distinct from string ids with the same digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ListingIdentity {
    Explicit(String),
    Numeric(String),
    Content(String),
}

impl ListingIdentity {
    /// First truthy of `id`, `token`, `post_token`, `postId` on the record,
    /// then on its card; otherwise the canonical serialization of the record.
    pub fn of(record: &Value) -> Self {
        let card = record.get(CARD_KEY).filter(|c| c.is_object());
        std::iter::once(record)
            .chain(card)
            .find_map(explicit_id)
            .unwrap_or_else(|| ListingIdentity::Content(canonical(record).to_string()))
    }
}

fn explicit_id(obj: &Value) -> Option<ListingIdentity> {
    IDENTITY_KEYS.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(ListingIdentity::Explicit(s.clone())),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(ListingIdentity::Numeric(n.to_string())),
        _ => None,
    })
}

/// Copy of `value` with every object's keys sorted, so that two records
/// differing only in key order serialize identically.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), canonical(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Collected set
// ---------------------------------------------------------------------------

/// Insertion-ordered listings, deduplicated by `ListingIdentity`.
/// The first occurrence wins and stored records are never modified.
#[derive(Debug, Clone, Default)]
pub struct CollectedSet {
    records: Vec<RawListing>,
    seen: HashSet<ListingIdentity>,
}

impl CollectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a record with the same identity is already present.
    pub fn insert(&mut self, record: RawListing) -> bool {
        if self.seen.insert(ListingIdentity::of(&record)) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    /// Appends every unseen record; returns how many were new.
    pub fn extend<I: IntoIterator<Item = RawListing>>(&mut self, records: I) -> usize {
        let mut added = 0;
        for record in records {
            if self.insert(record) {
                added += 1;
            }
        }
        added
    }

    pub fn merge(&mut self, other: CollectedSet) -> usize {
        self.extend(other.records)
    }

    /// New set holding the records that satisfy `keep`, order preserved.
    pub fn filtered<F: Fn(&RawListing) -> bool>(&self, keep: F) -> CollectedSet {
        let mut out = CollectedSet::new();
        out.extend(self.records.iter().filter(|r| keep(r)).cloned());
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawListing> {
        self.records.iter()
    }
}

impl Serialize for CollectedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Parsed listing
// ---------------------------------------------------------------------------

/// Fields derived from one listing. `None` means "could not be determined".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedListing {
    pub identity: ListingIdentity,
    pub title: Option<String>,
    pub price_per_sqm: Option<i64>,
    pub age: Option<i64>,
    pub size: Option<i64>,
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// Building-age bucket (years, inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "0-4")]
    UpTo4,
    #[serde(rename = "5-9")]
    From5To9,
    #[serde(rename = "10-14")]
    From10To14,
    #[serde(rename = "15-20")]
    From15To20,
}

impl AgeBucket {
    pub fn all() -> [AgeBucket; 4] {
        [AgeBucket::UpTo4, AgeBucket::From5To9, AgeBucket::From10To14, AgeBucket::From15To20]
    }

    /// `None` for ages outside every bucket (negative or over 20).
    pub fn of(age: i64) -> Option<Self> {
        match age {
            0..=4 => Some(AgeBucket::UpTo4),
            5..=9 => Some(AgeBucket::From5To9),
            10..=14 => Some(AgeBucket::From10To14),
            15..=20 => Some(AgeBucket::From15To20),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBucket::UpTo4 => "0-4",
            AgeBucket::From5To9 => "5-9",
            AgeBucket::From10To14 => "10-14",
            AgeBucket::From15To20 => "15-20",
        }
    }
}

impl std::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unit-size bucket (sqm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeBucket {
    #[serde(rename = "<80")]
    Small,
    #[serde(rename = "80-120")]
    Medium,
    #[serde(rename = ">120")]
    Large,
}

impl SizeBucket {
    pub fn all() -> [SizeBucket; 3] {
        [SizeBucket::Small, SizeBucket::Medium, SizeBucket::Large]
    }

    pub fn of(size: i64) -> Self {
        if size < 80 {
            SizeBucket::Small
        } else if size <= 120 {
            SizeBucket::Medium
        } else {
            SizeBucket::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "<80",
            SizeBucket::Medium => "80-120",
            SizeBucket::Large => ">120",
        }
    }
}

impl std::fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    pub avg: i64,
    pub count: u64,
}

/// Terminal artifact of a collection run. Field names are what the report
/// renderer indexes, and every bucket key is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub timestamp: String,
    pub requested_size_min: i64,
    pub requested_size_max: i64,
    pub total_posts: u64,
    pub valid_for_averages: u64,
    pub overall_avg_price_per_sqm: i64,
    pub age_intervals: BTreeMap<AgeBucket, BucketStats>,
    pub size_intervals: BTreeMap<SizeBucket, BucketStats>,
    pub age_size_matrix: BTreeMap<AgeBucket, BTreeMap<SizeBucket, BucketStats>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_prefers_top_level_id_then_card() {
        let top = json!({"id": "abc", "map_post_card": {"token": "zzz"}});
        assert_eq!(ListingIdentity::of(&top), ListingIdentity::Explicit("abc".into()));

        let card_only = json!({"map_post_card": {"token": "zzz", "title": "x"}});
        assert_eq!(ListingIdentity::of(&card_only), ListingIdentity::Explicit("zzz".into()));
    }

    #[test]
    fn empty_and_zero_ids_are_not_explicit() {
        let rec = json!({"id": "", "token": 0, "post_token": "p1"});
        assert_eq!(ListingIdentity::of(&rec), ListingIdentity::Explicit("p1".into()));
    }

    #[test]
    fn numeric_and_string_ids_are_distinct() {
        let numeric = json!({"id": 5});
        let text = json!({"id": "5"});
        assert_eq!(ListingIdentity::of(&numeric), ListingIdentity::Numeric("5".into()));
        assert_ne!(ListingIdentity::of(&numeric), ListingIdentity::of(&text));

        let mut set = CollectedSet::new();
        assert!(set.insert(numeric));
        assert!(set.insert(text));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn content_identity_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"x":1,"y":2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":{"y":2,"x":1},"a":1}"#).unwrap();
        let c = json!({"a": 1, "b": {"x": 1, "y": 3}});
        assert_eq!(ListingIdentity::of(&a), ListingIdentity::of(&b));
        assert_ne!(ListingIdentity::of(&a), ListingIdentity::of(&c));
        assert!(matches!(ListingIdentity::of(&a), ListingIdentity::Content(_)));
    }

    #[test]
    fn collected_set_keeps_first_occurrence() {
        let mut set = CollectedSet::new();
        assert!(set.insert(json!({"id": "1", "v": "first"})));
        assert!(!set.insert(json!({"id": "1", "v": "second"})));
        assert!(set.insert(json!({"id": "2"})));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap()["v"], "first");
    }

    #[test]
    fn merging_a_set_with_itself_is_idempotent() {
        let mut set = CollectedSet::new();
        set.extend(vec![json!({"id": "1"}), json!({"token": "t"}), json!({"x": 5})]);
        let before: Vec<Value> = set.iter().cloned().collect();

        let added = set.merge(set.clone());
        assert_eq!(added, 0);
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), before);
    }

    #[test]
    fn filtered_preserves_order() {
        let mut set = CollectedSet::new();
        set.extend((1..=5).map(|i| json!({"id": i})));
        let odd = set.filtered(|r| r["id"].as_i64().unwrap_or(0) % 2 == 1);
        let ids: Vec<i64> = odd.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn buckets_cover_documented_ranges() {
        assert_eq!(AgeBucket::of(0), Some(AgeBucket::UpTo4));
        assert_eq!(AgeBucket::of(9), Some(AgeBucket::From5To9));
        assert_eq!(AgeBucket::of(20), Some(AgeBucket::From15To20));
        assert_eq!(AgeBucket::of(21), None);
        assert_eq!(SizeBucket::of(79), SizeBucket::Small);
        assert_eq!(SizeBucket::of(80), SizeBucket::Medium);
        assert_eq!(SizeBucket::of(120), SizeBucket::Medium);
        assert_eq!(SizeBucket::of(121), SizeBucket::Large);
    }

    #[test]
    fn bucket_labels_honor_width() {
        assert_eq!(format!("{:>5}", AgeBucket::UpTo4), "  0-4");
        assert_eq!(format!("{:>6}", SizeBucket::Small), "   <80");
        assert_eq!(format!("{:<7}|", SizeBucket::Large), ">120   |");
    }

    #[test]
    fn bucket_maps_serialize_with_labels_in_order() {
        let mut map = BTreeMap::new();
        for b in AgeBucket::all() {
            map.insert(b, BucketStats::default());
        }
        let s = serde_json::to_string(&map).unwrap();
        assert_eq!(
            s,
            r#"{"0-4":{"avg":0,"count":0},"5-9":{"avg":0,"count":0},"10-14":{"avg":0,"count":0},"15-20":{"avg":0,"count":0}}"#
        );
    }
}
