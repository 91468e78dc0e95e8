use crate::types::SizeInterval;

/// Splits `[min, max]` into contiguous intervals of width `step`, the last
/// one clipped to `max`. Empty when `min > max`; a step below 1 counts as 1.
pub fn partition(min: i64, max: i64, step: i64) -> Vec<SizeInterval> {
    let step = step.max(1);
    let mut intervals = Vec::new();
    let mut lo = min;
    while lo <= max {
        let hi = lo.saturating_add(step - 1).min(max);
        intervals.push(SizeInterval::new(lo, hi));
        if hi == max {
            break;
        }
        lo = hi + 1;
    }
    intervals
}
