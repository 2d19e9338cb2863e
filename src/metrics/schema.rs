//! Row shapes stored by the Metrics Store: one row per
//! `(fingerprint, metric, tier, bucket_start)` aggregate.

use serde::{Deserialize, Serialize};

/// The four retention tiers a series is stored at. Raw holds individual
/// samples; minute/hour/day hold rolled-up aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Raw,
    Minute,
    Hour,
    Day,
}

impl Tier {
    pub fn bucket_width(self) -> chrono::Duration {
        match self {
            Tier::Raw => chrono::Duration::zero(),
            Tier::Minute => chrono::Duration::minutes(1),
            Tier::Hour => chrono::Duration::hours(1),
            Tier::Day => chrono::Duration::days(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Minute => "minute",
            Tier::Hour => "hour",
            Tier::Day => "day",
        }
    }

    /// The tier immediately coarser than this one, used when rolling up.
    pub fn next_coarser(self) -> Option<Tier> {
        match self {
            Tier::Raw => Some(Tier::Minute),
            Tier::Minute => Some(Tier::Hour),
            Tier::Hour => Some(Tier::Day),
            Tier::Day => None,
        }
    }

    pub fn all() -> [Tier; 4] {
        [Tier::Raw, Tier::Minute, Tier::Hour, Tier::Day]
    }
}

/// One stored aggregate point. For the raw tier, `avg == min == max == last`
/// and `count == 1`. `last` is the value of the chronologically latest
/// sample folded into the bucket, not the latest bucket in a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub fingerprint: String,
    pub metric: String,
    pub tier: Tier,
    pub bucket_start: chrono::DateTime<chrono::Utc>,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub count: u32,
}

impl MetricPoint {
    pub fn raw(fingerprint: String, metric: String, at: chrono::DateTime<chrono::Utc>, value: f64) -> Self {
        Self {
            fingerprint,
            metric,
            tier: Tier::Raw,
            bucket_start: at,
            avg: value,
            min: value,
            max: value,
            last: value,
            count: 1,
        }
    }
}
