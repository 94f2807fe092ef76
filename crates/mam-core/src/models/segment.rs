use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

/// Half-open media time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Duration,
    pub end: Duration,
}

impl TimeRange {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// `true` if `next` starts exactly where `self` ends.
    pub fn is_followed_by(&self, next: &TimeRange) -> bool {
        self.end == next.start && next.start < next.end
    }
}

/// Rendered in TAMS timerange notation: `[<secs>:<nanos>_<secs>:<nanos>)`.
impl Display for TimeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "[{}:{}_{}:{})",
            self.start.as_secs(),
            self.start.subsec_nanos(),
            self.end.as_secs(),
            self.end.subsec_nanos()
        )
    }
}

/// A registered, time-bounded slice of the transcoded media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub object_id: String,
    pub range: TimeRange,
}
