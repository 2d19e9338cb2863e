//! Tiered Metrics Store.
//!
//! Batch-buffer-then-flush ingestion with command/reply request handling
//! and a background retention task, storing per-metric time series across
//! four tiers (raw/minute/hour/day), with periodic rollup and tier-aware
//! range queries.

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;
pub mod tiers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::config::MetricsConfig;
use crate::normalize::ResourceDelta;
use backend::{MetricsBackend, MetricsStats, QueryRange};
use schema::{MetricPoint, Tier};

const RAW_FLUSH_BATCH_SIZE: usize = 100;

/// The metric field names extracted off `crate::model::Metrics` and stored
/// as independent series, one row per name per resource.
const TRACKED_METRICS: &[&str] = &[
    "cpu_pct",
    "memory_used_bytes",
    "disk_used_bytes",
    "disk_read_bytes_per_sec",
    "disk_write_bytes_per_sec",
    "net_rx_bytes_per_sec",
    "net_tx_bytes_per_sec",
];

fn extract_samples(resource: &crate::model::Resource) -> Vec<(&'static str, f64)> {
    let m = &resource.metrics;
    let candidates: [(&'static str, Option<f64>); 7] = [
        ("cpu_pct", m.cpu_pct),
        ("memory_used_bytes", m.memory_used_bytes.map(|v| v as f64)),
        ("disk_used_bytes", m.disk_used_bytes.map(|v| v as f64)),
        ("disk_read_bytes_per_sec", m.disk_read_bytes_per_sec),
        ("disk_write_bytes_per_sec", m.disk_write_bytes_per_sec),
        ("net_rx_bytes_per_sec", m.net_rx_bytes_per_sec),
        ("net_tx_bytes_per_sec", m.net_tx_bytes_per_sec),
    ];
    candidates
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
        .collect()
}

struct SeriesMeta {
    last_timestamp: chrono::DateTime<chrono::Utc>,
    last_access: std::time::Instant,
}

enum Command {
    QueryRange {
        fingerprint: String,
        metric: String,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        min_points: usize,
        max_points: usize,
        reply: oneshot::Sender<Vec<MetricPoint>>,
    },
    Flush(oneshot::Sender<()>),
    Stats(oneshot::Sender<MetricsStats>),
    Shutdown,
}

pub struct MetricsStoreActor {
    backend: Arc<dyn MetricsBackend>,
    config: MetricsConfig,
    delta_rx: broadcast::Receiver<ResourceDelta>,
    command_rx: mpsc::Receiver<Command>,
    buffer: Vec<MetricPoint>,
    series: HashMap<(String, String), SeriesMeta>,
    stats: MetricsStats,
}

impl MetricsStoreActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let mut flush_tick = tokio::time::interval(Duration::from_secs(self.config.flush_interval_seconds));
        let mut rollup_tick = tokio::time::interval(Duration::from_secs(60));
        let mut retention_tick = tokio::time::interval(Duration::from_secs(3600));
        let mut lru_tick = tokio::time::interval(Duration::from_secs(3600));

        loop {
            tokio::select! {
                delta = self.delta_rx.recv() => {
                    match delta {
                        Ok(delta) => self.ingest_delta(delta).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "metrics store lagged behind resource cache");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush().await;
                }
                _ = rollup_tick.tick() => {
                    self.roll_up_all().await;
                }
                _ = retention_tick.tick() => {
                    self.apply_retention().await;
                }
                _ = lru_tick.tick() => {
                    self.evict_lru();
                }
                Some(cmd) = self.command_rx.recv() => {
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
            }
        }

        self.flush().await;
        let _ = self.backend.close().await;
        debug!("metrics store shut down");
    }

    async fn ingest_delta(&mut self, delta: ResourceDelta) {
        for resource in &delta.upserted {
            for (metric, value) in extract_samples(resource) {
                self.ingest_sample(
                    resource.fingerprint.as_str().to_string(),
                    metric.to_string(),
                    resource.last_seen,
                    value,
                );
            }
        }
        if self.buffer.len() >= RAW_FLUSH_BATCH_SIZE {
            self.flush().await;
        }
    }

    /// Out-of-order samples (timestamp not strictly after the series' last
    /// recorded timestamp) are rejected and counted, never stored, per
    /// the ingestion contract.
    fn ingest_sample(&mut self, fingerprint: String, metric: String, at: chrono::DateTime<chrono::Utc>, value: f64) {
        let key = (fingerprint.clone(), metric.clone());
        let now = std::time::Instant::now();

        if let Some(meta) = self.series.get_mut(&key) {
            if at <= meta.last_timestamp {
                self.stats.rejected_out_of_order += 1;
                return;
            }
            meta.last_timestamp = at;
            meta.last_access = now;
        } else {
            self.series.insert(
                key,
                SeriesMeta {
                    last_timestamp: at,
                    last_access: now,
                },
            );
        }

        self.buffer.push(MetricPoint::raw(fingerprint, metric, at, value));
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        if let Err(e) = self.backend.insert_batch(&batch).await {
            warn!(error = %e, "failed to flush metrics batch");
            // Samples are dropped rather than retried indefinitely; a
            // persistent backend failure is surfaced via health_check.
        } else {
            self.stats.flush_count += 1;
        }
    }

    /// Idempotent rollup: re-derives the previous tier's full range and
    /// rewrites the target tier's buckets, so re-running after a crash
    /// mid-rollup never double-counts (P1: idempotent rollup).
    async fn roll_up_all(&mut self) {
        let series_keys: Vec<(String, String)> = self.series.keys().cloned().collect();
        for (fingerprint, metric) in series_keys {
            for tier in [Tier::Raw, Tier::Minute, Tier::Hour] {
                let Some(target) = tier.next_coarser() else { continue };
                let window = match target {
                    Tier::Minute => chrono::Duration::hours(1),
                    Tier::Hour => chrono::Duration::days(1),
                    Tier::Day => chrono::Duration::days(7),
                    Tier::Raw => continue,
                };
                let end = chrono::Utc::now();
                let start = end - window;
                let range = QueryRange {
                    fingerprint: fingerprint.clone(),
                    metric: metric.clone(),
                    tier,
                    start,
                    end,
                };
                match self.backend.query_range(&range).await {
                    Ok(points) if !points.is_empty() => {
                        let rolled = tiers::roll_up(&points, target);
                        if let Err(e) = self.backend.insert_batch(&rolled).await {
                            warn!(error = %e, "rollup insert failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "rollup query failed"),
                }
            }
        }
    }

    async fn apply_retention(&mut self) {
        let now = chrono::Utc::now();
        let windows = [
            (Tier::Raw, self.config.raw_retention_hours as i64 * 3600),
            (Tier::Minute, self.config.minute_retention_days as i64 * 86_400),
            (Tier::Hour, self.config.hour_retention_days as i64 * 86_400),
            (Tier::Day, self.config.day_retention_days as i64 * 86_400),
        ];
        for (tier, retention_seconds) in windows {
            let cutoff = now - chrono::Duration::seconds(retention_seconds);
            match self.backend.cleanup_older_than(tier, cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    info!(tier = tier.as_str(), deleted, "retention cleanup");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "retention cleanup failed"),
            }
        }
        self.stats.last_cleanup = Some(now);
    }

    /// Evict series untouched for more than 24h once the series count
    /// exceeds `max_series`, evicting least-recently-used series. Eviction
    /// only drops the in-memory series-tracking entry (so out-of-order
    /// detection resets for that series); stored points age out normally
    /// via retention.
    fn evict_lru(&mut self) {
        if self.series.len() <= self.config.max_series {
            return;
        }
        let grace = Duration::from_secs(24 * 3600);
        let now = std::time::Instant::now();
        let mut candidates: Vec<(String, String)> = self
            .series
            .iter()
            .filter(|(_, meta)| now.duration_since(meta.last_access) > grace)
            .map(|(k, _)| k.clone())
            .collect();

        if candidates.is_empty() {
            return;
        }

        candidates.sort_by_key(|k| self.series.get(k).map(|m| m.last_access));
        let over_budget = self.series.len() - self.config.max_series;
        for key in candidates.into_iter().take(over_budget) {
            self.series.remove(&key);
        }
        self.stats.series_count = self.series.len();
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::QueryRange {
                fingerprint,
                metric,
                start,
                end,
                min_points,
                max_points,
                reply,
            } => {
                let tier = tiers::choose_tier((end - start).num_seconds(), min_points, max_points);
                let range = QueryRange {
                    fingerprint,
                    metric,
                    tier,
                    start,
                    end,
                };
                let points = self.backend.query_range(&range).await.unwrap_or_default();
                let _ = reply.send(points);
                true
            }
            Command::Flush(reply) => {
                self.flush().await;
                let _ = reply.send(());
                true
            }
            Command::Stats(reply) => {
                self.stats.series_count = self.series.len();
                self.stats.points_buffered = self.buffer.len();
                let _ = reply.send(self.stats.clone());
                true
            }
            Command::Shutdown => false,
        }
    }
}

#[derive(Clone)]
pub struct MetricsStoreHandle {
    command_tx: mpsc::Sender<Command>,
}

impl MetricsStoreHandle {
    pub fn spawn(
        backend: Arc<dyn MetricsBackend>,
        config: MetricsConfig,
        delta_rx: broadcast::Receiver<ResourceDelta>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let actor = MetricsStoreActor {
            backend,
            config,
            delta_rx,
            command_rx,
            buffer: Vec::new(),
            series: HashMap::new(),
            stats: MetricsStats::default(),
        };
        tokio::spawn(actor.run());
        Self { command_tx }
    }

    pub async fn query_range(
        &self,
        fingerprint: String,
        metric: String,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        min_points: usize,
        max_points: usize,
    ) -> Vec<MetricPoint> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::QueryRange {
            fingerprint,
            metric,
            start,
            end,
            min_points,
            max_points,
            reply,
        };
        if self.command_tx.send(cmd).await.is_ok() {
            rx.await.unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(Command::Flush(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn stats(&self) -> MetricsStats {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(Command::Stats(reply)).await.is_ok() {
            rx.await.unwrap_or_default()
        } else {
            MetricsStats::default()
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}
