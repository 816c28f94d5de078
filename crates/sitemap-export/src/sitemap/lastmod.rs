//! Last-modified timestamps as they appear in `<lastmod>`.
//!
//! Source records carry timestamps in whatever format the index mapping
//! produces. Parsing is lenient; rendering is normalized W3C datetime so the
//! same input always produces the same bytes.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt;

/// Earliest calendar year accepted in sitemap output.
pub const MIN_SITEMAP_YEAR: i32 = 2000;

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A parsed last-modified value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastModified {
    /// Date without a time component (`2024-05-01`).
    Date(NaiveDate),
    /// Full timestamp in the offset it was written with.
    DateTime(DateTime<FixedOffset>),
}

impl LastModified {
    /// Parse a raw timestamp. Any calendar year is accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::DateTime(dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Some(Self::DateTime(dt));
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Self::DateTime(naive.and_utc().fixed_offset()));
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(Self::Date)
    }

    /// Convert an epoch-millisecond value, as returned by `max` aggregations.
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self::from)
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(date) => date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            Self::DateTime(dt) => dt.with_timezone(&Utc),
        }
    }

    /// Calendar year in the value's own offset.
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        match self {
            Self::Date(date) => date.year(),
            Self::DateTime(dt) => dt.year(),
        }
    }

    /// Whether the value passes the sitemap year floor.
    pub fn is_sitemap_valid(&self) -> bool {
        self.year() >= MIN_SITEMAP_YEAR
    }

    /// The later of two optional values.
    pub fn latest(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b.to_utc() > a.to_utc() { b } else { a }),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

impl From<DateTime<Utc>> for LastModified {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt.fixed_offset())
    }
}

impl fmt::Display for LastModified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::DateTime(dt) => f.write_str(
                &dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        }
    }
}
