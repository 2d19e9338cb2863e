//! Integration coverage for the tiered Metrics Store's SQLite backend:
//! P2 (retention bounds), P3 (tier selection contract) and the per-tier
//! idempotent insert (upsert on the `(fingerprint, metric, tier,
//! bucket_start)` primary key).

use chrono::{Duration, TimeZone, Utc};
use pulse_core::metrics::backend::{MetricsBackend, QueryRange};
use pulse_core::metrics::schema::{MetricPoint, Tier};
use pulse_core::metrics::sqlite::SqliteMetricsBackend;
use pulse_core::metrics::tiers::choose_tier;

async fn backend() -> (SqliteMetricsBackend, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let backend = SqliteMetricsBackend::new(path.to_str().unwrap()).await.unwrap();
    (backend, dir)
}

#[tokio::test]
async fn insert_then_query_round_trips_a_point() {
    let (backend, _dir) = backend().await;
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let point = MetricPoint::raw("fp1".into(), "cpu_pct".into(), at, 42.0);
    backend.insert_batch(&[point.clone()]).await.unwrap();

    let range = QueryRange {
        fingerprint: "fp1".into(),
        metric: "cpu_pct".into(),
        tier: Tier::Raw,
        start: at - Duration::seconds(1),
        end: at + Duration::seconds(1),
    };
    let points = backend.query_range(&range).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].avg, 42.0);
}

/// Re-inserting a point at the same `(fingerprint, metric, tier,
/// bucket_start)` key overwrites rather than duplicates it — the
/// primary-key upsert that makes rollup idempotent at the storage layer
/// (P1 combined with persistence).
#[tokio::test]
async fn reinserting_same_key_upserts_not_duplicates() {
    let (backend, _dir) = backend().await;
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let first = MetricPoint::raw("fp1".into(), "cpu_pct".into(), at, 10.0);
    let mut second = first.clone();
    second.avg = 20.0;

    backend.insert_batch(&[first]).await.unwrap();
    backend.insert_batch(&[second]).await.unwrap();

    let range = QueryRange {
        fingerprint: "fp1".into(),
        metric: "cpu_pct".into(),
        tier: Tier::Raw,
        start: at - Duration::seconds(1),
        end: at + Duration::seconds(1),
    };
    let points = backend.query_range(&range).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].avg, 20.0);
}

/// P2 — after `cleanup_older_than`, no point strictly before the cutoff
/// remains in that tier; points at or after the cutoff are untouched.
#[tokio::test]
async fn cleanup_older_than_trims_exactly_the_expired_points() {
    let (backend, _dir) = backend().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let old = MetricPoint::raw("fp1".into(), "cpu_pct".into(), now - Duration::hours(3), 1.0);
    let recent = MetricPoint::raw("fp1".into(), "cpu_pct".into(), now - Duration::minutes(5), 2.0);
    backend.insert_batch(&[old, recent]).await.unwrap();

    let deleted = backend.cleanup_older_than(Tier::Raw, now - Duration::hours(2)).await.unwrap();
    assert_eq!(deleted, 1);

    let range = QueryRange {
        fingerprint: "fp1".into(),
        metric: "cpu_pct".into(),
        tier: Tier::Raw,
        start: now - Duration::hours(4),
        end: now,
    };
    let points = backend.query_range(&range).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].avg, 2.0);
}

/// P3 — for a range whose minute-tier point count falls within
/// `[minPoints, maxPoints]`, the minute tier is selected (the finest tier
/// that satisfies both bounds), for a tier-aware range query.
#[test]
fn tier_selection_picks_minute_when_it_fits_both_bounds() {
    let two_hours = 2 * 3600;
    let tier = choose_tier(two_hours, 60, 200);
    assert_eq!(tier, Tier::Minute);
    // Sanity-check the arithmetic the contract is built on: 2h at a
    // 60s bucket width is exactly 120 points, within [60, 200].
    assert!((60..=200).contains(&(two_hours / 60)));
}

/// A week-long range with a modest point budget falls back to the hour
/// tier, since neither raw nor minute fit under `maxPoints` and neither
/// hour nor day alone clear `minPoints` — the coarsest tier within
/// `maxPoints` is returned per the "if none satisfies both" fallback.
#[test]
fn tier_selection_falls_back_when_no_tier_satisfies_both_bounds() {
    let one_week = 7 * 24 * 3600;
    let tier = choose_tier(one_week, 100, 2000);
    assert_eq!(tier, Tier::Hour);
}
