//! Time windows and platform timestamp conversion
//!
//! The chat platform addresses messages by `<seconds>.<microseconds>`
//! timestamp strings. History requests take the same form for their
//! `oldest`/`latest` bounds, so a window converts both ways.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// A `[start, end]` retrieval window derived from `(days, hours, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub days: i64,
    pub hours: i64,
    /// Upper bound of the window
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window reaching back `days` and `hours` from now.
    pub fn last(days: i64, hours: i64) -> Self {
        Self::ending_at(days, hours, Utc::now())
    }

    /// Window reaching back `days` and `hours` from an explicit end instant.
    pub fn ending_at(days: i64, hours: i64, end: DateTime<Utc>) -> Self {
        Self { days, hours, end }
    }

    /// Lower bound of the window.
    pub fn start(&self) -> DateTime<Utc> {
        self.end - Duration::days(self.days) - Duration::hours(self.hours)
    }

    /// Lower bound in platform `sec.micro` form, for `oldest=`.
    pub fn oldest_ts(&self) -> String {
        format_platform_ts(self.start())
    }

    /// Upper bound in platform `sec.micro` form, for `latest=`.
    pub fn latest_ts(&self) -> String {
        format_platform_ts(self.end)
    }

    /// Human-readable label for view headers, e.g. `"4d 2h ago to now"`.
    pub fn label(&self) -> String {
        format!("{}d {}h ago to now", self.days, self.hours)
    }
}

/// Parse a platform `sec.micro` timestamp string into a UTC instant.
///
/// Returns None for malformed input; fractional digits beyond microseconds
/// are ignored.
pub fn parse_platform_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (sec_part, micro_part) = match ts.split_once('.') {
        Some((s, m)) => (s, m),
        None => (ts, "0"),
    };

    let secs: i64 = sec_part.parse().ok()?;
    let micros_str: String = micro_part.chars().take(6).collect();
    let mut micros: i64 = micros_str.parse().ok()?;
    // Right-pad short fractions: "1.5" means 500000 microseconds
    for _ in micros_str.len()..6 {
        micros *= 10;
    }

    DateTime::from_timestamp(secs, (micros * 1_000) as u32)
}

/// Format a UTC instant as the platform `sec.micro` timestamp string.
pub fn format_platform_ts(dt: DateTime<Utc>) -> String {
    format!("{}.{:06}", dt.timestamp(), dt.timestamp_subsec_micros())
}

/// Enumerate every calendar day in `[start, end]` (inclusive) as
/// `YYYY-MM-DD` strings. Returns an empty list when `start > end` or either
/// date is malformed.
pub fn enumerate_dates(start: &str, end: &str) -> Vec<String> {
    let (Ok(mut day), Ok(last)) = (
        NaiveDate::parse_from_str(start, "%Y-%m-%d"),
        NaiveDate::parse_from_str(end, "%Y-%m-%d"),
    ) else {
        return vec![];
    };

    let mut dates = Vec::new();
    while day <= last {
        dates.push(day.format("%Y-%m-%d").to_string());
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Validate a `YYYY-MM-DD` partition date string.
pub fn is_valid_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

/// Today's UTC date as a partition key.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
