use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// Timestamps above this are treated as milliseconds.
pub const MILLISECOND_THRESHOLD: i64 = 1_000_000_000_000;

/// BucketCalculator groups events into UTC calendar days.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketCalculator;

impl BucketCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Unix seconds, accepting millisecond inputs.
    pub fn normalize_timestamp(raw: i64) -> i64 {
        if raw > MILLISECOND_THRESHOLD {
            raw / 1000
        } else {
            raw
        }
    }

    pub fn to_datetime(timestamp_seconds: i64) -> Option<NaiveDateTime> {
        DateTime::from_timestamp(timestamp_seconds, 0).map(|dt| dt.naive_utc())
    }

    /// Calendar day a timestamp falls on.
    pub fn bucket_date(&self, timestamp_seconds: i64) -> Option<NaiveDate> {
        Self::to_datetime(timestamp_seconds).map(|dt| dt.date())
    }

    /// First day of a trailing window of `days` days ending on `today` inclusive.
    pub fn trailing_window_start(&self, today: NaiveDate, days: i64) -> NaiveDate {
        today - Duration::days(days - 1)
    }
}
