//! SQLite-backed `MetricsBackend`: WAL mode, busy timeout, a pool of 5
//! connections, `sqlx::migrate!` on startup, queries against the tiered
//! `metric_points` table.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::info;

use super::backend::{HealthStatus, MetricsBackend, QueryRange};
use super::error::{MetricsError, MetricsResult};
use super::schema::{MetricPoint, Tier};

pub struct SqliteMetricsBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteMetricsBackend {
    pub async fn new(db_path: &str) -> MetricsResult<Self> {
        let connect_url = format!("sqlite://{db_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&connect_url)
            .await
            .map_err(|e| MetricsError::ConnectionFailed(e.to_string()))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(path = %db_path, "metrics sqlite backend ready");

        Ok(Self {
            pool,
            db_path: db_path.to_string(),
        })
    }
}

fn tier_str(tier: Tier) -> &'static str {
    tier.as_str()
}

fn parse_tier(s: &str) -> Tier {
    match s {
        "minute" => Tier::Minute,
        "hour" => Tier::Hour,
        "day" => Tier::Day,
        _ => Tier::Raw,
    }
}

#[async_trait]
impl MetricsBackend for SqliteMetricsBackend {
    async fn insert_batch(&self, points: &[MetricPoint]) -> MetricsResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for point in points {
            sqlx::query(
                "INSERT INTO metric_points (fingerprint, metric, tier, bucket_start, avg, min, max, last, count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(fingerprint, metric, tier, bucket_start)
                 DO UPDATE SET avg = excluded.avg, min = excluded.min, max = excluded.max, last = excluded.last, count = excluded.count",
            )
            .bind(&point.fingerprint)
            .bind(&point.metric)
            .bind(tier_str(point.tier))
            .bind(point.bucket_start.to_rfc3339())
            .bind(point.avg)
            .bind(point.min)
            .bind(point.max)
            .bind(point.last)
            .bind(point.count as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_range(&self, range: &QueryRange) -> MetricsResult<Vec<MetricPoint>> {
        let rows = sqlx::query(
            "SELECT fingerprint, metric, tier, bucket_start, avg, min, max, last, count
             FROM metric_points
             WHERE fingerprint = ? AND metric = ? AND tier = ? AND bucket_start >= ? AND bucket_start < ?
             ORDER BY bucket_start ASC",
        )
        .bind(&range.fingerprint)
        .bind(&range.metric)
        .bind(tier_str(range.tier))
        .bind(range.start.to_rfc3339())
        .bind(range.end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let bucket_start_str: String = row.try_get("bucket_start")?;
                let bucket_start = chrono::DateTime::parse_from_rfc3339(&bucket_start_str)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|e| sqlx::Error::ColumnDecode {
                        index: "bucket_start".into(),
                        source: Box::new(e),
                    })?;
                let tier_str: String = row.try_get("tier")?;
                Ok(MetricPoint {
                    fingerprint: row.try_get("fingerprint")?,
                    metric: row.try_get("metric")?,
                    tier: parse_tier(&tier_str),
                    bucket_start,
                    avg: row.try_get("avg")?,
                    min: row.try_get("min")?,
                    max: row.try_get("max")?,
                    last: row.try_get("last")?,
                    count: row.try_get::<i64, _>("count")? as u32,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(MetricsError::from)
    }

    async fn cleanup_older_than(&self, tier: Tier, cutoff: chrono::DateTime<chrono::Utc>) -> MetricsResult<u64> {
        let result = sqlx::query("DELETE FROM metric_points WHERE tier = ? AND bucket_start < ?")
            .bind(tier_str(tier))
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> MetricsResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: None,
            }),
            Err(e) => Ok(HealthStatus {
                healthy: false,
                message: Some(e.to_string()),
            }),
        }
    }

    async fn close(&self) -> MetricsResult<()> {
        self.pool.close().await;
        info!(path = %self.db_path, "metrics sqlite backend closed");
        Ok(())
    }
}
