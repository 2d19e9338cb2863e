//! `MetricsBackend` trait: persistence for tiered `MetricPoint`s keyed by
//! `(fingerprint, metric, tier)`.

use async_trait::async_trait;

use super::error::MetricsResult;
use super::schema::{MetricPoint, Tier};

#[derive(Debug, Clone)]
pub struct QueryRange {
    pub fingerprint: String,
    pub metric: String,
    pub tier: Tier,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsStats {
    pub series_count: usize,
    pub points_buffered: usize,
    pub flush_count: u64,
    pub rejected_out_of_order: u64,
    pub last_cleanup: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn insert_batch(&self, points: &[MetricPoint]) -> MetricsResult<()>;
    async fn query_range(&self, range: &QueryRange) -> MetricsResult<Vec<MetricPoint>>;
    async fn cleanup_older_than(&self, tier: Tier, cutoff: chrono::DateTime<chrono::Utc>) -> MetricsResult<u64>;
    async fn health_check(&self) -> MetricsResult<HealthStatus>;
    async fn close(&self) -> MetricsResult<()>;
}
