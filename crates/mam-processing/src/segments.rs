use mam_core::TimeRange;
use std::time::Duration;

/// Number of ranges [`plan_segments`] returns for the same arguments.
pub fn segment_count(total: Duration, step: Duration) -> u128 {
    if total.is_zero() || step.is_zero() {
        return 0;
    }
    total.as_nanos().div_ceil(step.as_nanos())
}

/// Time ranges covering `[0, total)` in steps of `step`; the last range ends at `total`.
///
/// Ranges are contiguous and non-overlapping. An empty plan is returned when either
/// argument is zero.
pub fn plan_segments(total: Duration, step: Duration) -> Vec<TimeRange> {
    if total.is_zero() || step.is_zero() {
        return Vec::new();
    }

    let total_ns = total.as_nanos();
    let step_ns = step.as_nanos();
    let count = segment_count(total, step);

    (0..count)
        .map(|i| {
            let start = step_ns * i;
            let end = (start + step_ns).min(total_ns);
            TimeRange::new(from_nanos(start), from_nanos(end))
        })
        .collect()
}

fn from_nanos(nanos: u128) -> Duration {
    Duration::new(
        (nanos / 1_000_000_000) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}
