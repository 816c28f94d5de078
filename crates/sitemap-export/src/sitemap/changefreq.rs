//! `<changefreq>` classification.

use super::lastmod::LastModified;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Sitemap change-frequency label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a record kind derives its change frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyRule {
    /// Slowly changing reference data. Always `monthly`.
    Reference,
    /// Transactional or activity records, bucketed by age.
    Activity,
}

/// Classify a record. Absent timestamps are treated as "just modified".
pub fn classify(
    rule: FrequencyRule,
    last_modified: Option<&LastModified>,
    now: DateTime<Utc>,
) -> ChangeFrequency {
    match rule {
        FrequencyRule::Reference => ChangeFrequency::Monthly,
        FrequencyRule::Activity => {
            let then = last_modified.map(LastModified::to_utc).unwrap_or(now);
            match days_since(then, now) {
                d if d < 7 => ChangeFrequency::Daily,
                d if d < 30 => ChangeFrequency::Weekly,
                d if d < 90 => ChangeFrequency::Monthly,
                _ => ChangeFrequency::Yearly,
            }
        }
    }
}

/// Classify a record whose timestamp is present but unreadable.
///
/// An unknown age never counts as recent activity.
pub fn classify_unparseable(rule: FrequencyRule) -> ChangeFrequency {
    match rule {
        FrequencyRule::Reference => ChangeFrequency::Monthly,
        FrequencyRule::Activity => ChangeFrequency::Yearly,
    }
}

/// Whole days elapsed between `then` and `now`, rounded down.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}
