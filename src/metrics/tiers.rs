//! Wall-clock-aligned downsampling.
//!
//! Bucket boundaries are aligned to the wall clock (minute/hour/day, UTC)
//! rather than to ingestion time, so rollup is deterministic and
//! idempotent: rolling up the same raw points into the same tier twice
//! yields byte-identical aggregates (P1: idempotent rollup).

use chrono::Timelike;

use super::schema::{MetricPoint, Tier};

/// Floor a timestamp to the start of its bucket for `tier`.
pub fn bucket_start(tier: Tier, at: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    match tier {
        Tier::Raw => at,
        Tier::Minute => at.with_second(0).unwrap().with_nanosecond(0).unwrap(),
        Tier::Hour => at
            .with_minute(0)
            .unwrap()
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
        Tier::Day => at
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc(),
    }
}

/// Roll up a set of finer-tier points (all belonging to one series) into
/// the next coarser tier's buckets. Pure function of its inputs: calling
/// it twice on the same `points` produces the same output, which is what
/// makes re-running a rollup after a crash safe.
pub fn roll_up(points: &[MetricPoint], target_tier: Tier) -> Vec<MetricPoint> {
    use std::collections::BTreeMap;

    // (sum, min, max, count, latest source timestamp folded in, its value)
    type Acc = (f64, f64, f64, u32, chrono::DateTime<chrono::Utc>, f64);
    let mut buckets: BTreeMap<chrono::DateTime<chrono::Utc>, Acc> = BTreeMap::new();
    for point in points {
        let start = bucket_start(target_tier, point.bucket_start);
        let entry = buckets
            .entry(start)
            .or_insert((0.0, f64::MAX, f64::MIN, 0, chrono::DateTime::<chrono::Utc>::MIN_UTC, 0.0));
        entry.0 += point.avg * point.count as f64;
        entry.1 = entry.1.min(point.min);
        entry.2 = entry.2.max(point.max);
        entry.3 += point.count;
        if point.bucket_start >= entry.4 {
            entry.4 = point.bucket_start;
            entry.5 = point.last;
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_start, (sum, min, max, count, _, last))| MetricPoint {
            fingerprint: points[0].fingerprint.clone(),
            metric: points[0].metric.clone(),
            tier: target_tier,
            bucket_start,
            avg: if count > 0 { sum / count as f64 } else { 0.0 },
            min,
            max,
            last,
            count,
        })
        .collect()
}

/// Choose the coarsest tier whose point count over `[start, end)` falls
/// within `[min_points, max_points]`, for a tier-aware range query
/// contract. Falls back to the finest tier if even `Raw` underflows
/// `min_points` (the range is simply short), and to the coarsest tier if
/// even `Day` overflows `max_points` (the range is simply long).
pub fn choose_tier(
    range_seconds: i64,
    min_points: usize,
    max_points: usize,
) -> Tier {
    let candidates = [
        (Tier::Raw, 10_i64),
        (Tier::Minute, 60),
        (Tier::Hour, 3600),
        (Tier::Day, 86_400),
    ];

    let mut chosen = Tier::Day;
    for (tier, bucket_seconds) in candidates {
        let points = (range_seconds / bucket_seconds).max(1) as usize;
        if points >= min_points && points <= max_points {
            return tier;
        }
        if points <= max_points {
            chosen = tier;
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minute_bucket_floors_seconds() {
        let at = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 45).unwrap();
        let bucket = bucket_start(Tier::Minute, at);
        assert_eq!(bucket.minute(), 30);
        assert_eq!(bucket.second(), 0);
    }

    #[test]
    fn rollup_is_idempotent() {
        let base = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let points = vec![
            MetricPoint::raw("fp".into(), "cpu_pct".into(), base, 10.0),
            MetricPoint::raw(
                "fp".into(),
                "cpu_pct".into(),
                base + chrono::Duration::seconds(10),
                20.0,
            ),
        ];
        let once = roll_up(&points, Tier::Minute);
        let twice = roll_up(&roll_up(&points, Tier::Minute), Tier::Minute);
        assert_eq!(once, twice);
        assert_eq!(once[0].avg, 15.0);
        assert_eq!(once[0].count, 2);
        assert_eq!(once[0].last, 20.0);
    }

    #[test]
    fn tier_choice_prefers_coarsest_within_bounds() {
        // One week, a typical dashboard wants ~500 points.
        let week_seconds = 7 * 86_400;
        assert_eq!(choose_tier(week_seconds, 100, 2000), Tier::Hour);
    }
}
