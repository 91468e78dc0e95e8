use std::collections::BTreeMap;

use crate::config::PriceBand;
use crate::types::{AgeBucket, BucketStats, ParsedListing, SizeBucket, SizeInterval, SummaryRecord};

/// Timestamp format of `SummaryRecord::timestamp`; the report renderer parses it back.
pub const SUMMARY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: i128,
    count: u64,
}

impl Accumulator {
    fn add(&mut self, price: i64) {
        self.sum += i128::from(price);
        self.count += 1;
    }

    /// Truncated arithmetic mean; 0 for an empty bucket.
    fn stats(&self) -> BucketStats {
        let avg = if self.count == 0 {
            0
        } else {
            i64::try_from(self.sum / i128::from(self.count)).unwrap_or(i64::MAX)
        };
        BucketStats { avg, count: self.count }
    }
}

/// Folds parsed listings into one `SummaryRecord`.
#[derive(Debug, Clone, Copy)]
pub struct AggregationEngine {
    band: PriceBand,
}

impl AggregationEngine {
    pub fn new(band: PriceBand) -> Self {
        Self { band }
    }

    /// Pure: the same listings, bounds and timestamp give the same record.
    pub fn summarize(
        &self,
        listings: &[ParsedListing],
        bounds: SizeInterval,
        timestamp: chrono::NaiveDateTime,
    ) -> SummaryRecord {
        let mut overall = Accumulator::default();
        let mut by_age: BTreeMap<AgeBucket, Accumulator> =
            AgeBucket::all().into_iter().map(|b| (b, Accumulator::default())).collect();
        let mut by_size: BTreeMap<SizeBucket, Accumulator> =
            SizeBucket::all().into_iter().map(|b| (b, Accumulator::default())).collect();
        let mut matrix: BTreeMap<(AgeBucket, SizeBucket), Accumulator> = BTreeMap::new();

        for listing in listings {
            let Some(price) = listing.price_per_sqm.filter(|p| self.band.contains(*p)) else {
                continue;
            };
            overall.add(price);

            let age_bucket = listing.age.and_then(AgeBucket::of);
            let size_bucket = listing.size.map(SizeBucket::of);

            if let Some(age) = age_bucket {
                by_age.entry(age).or_default().add(price);
            }
            if let Some(size) = size_bucket {
                by_size.entry(size).or_default().add(price);
            }
            if let (Some(age), Some(size)) = (age_bucket, size_bucket) {
                matrix.entry((age, size)).or_default().add(price);
            }
        }

        let age_size_matrix = AgeBucket::all()
            .into_iter()
            .map(|age| {
                let row = SizeBucket::all()
                    .into_iter()
                    .map(|size| {
                        let cell = matrix.get(&(age, size)).copied().unwrap_or_default();
                        (size, cell.stats())
                    })
                    .collect();
                (age, row)
            })
            .collect();

        SummaryRecord {
            timestamp: timestamp.format(SUMMARY_TIMESTAMP_FORMAT).to_string(),
            requested_size_min: bounds.min,
            requested_size_max: bounds.max,
            total_posts: listings.len() as u64,
            valid_for_averages: overall.count,
            overall_avg_price_per_sqm: overall.stats().avg,
            age_intervals: by_age.into_iter().map(|(k, acc)| (k, acc.stats())).collect(),
            size_intervals: by_size.into_iter().map(|(k, acc)| (k, acc.stats())).collect(),
            age_size_matrix,
        }
    }
}
