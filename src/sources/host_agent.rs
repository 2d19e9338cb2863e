//! Host-agent source client.
//!
//! A lightweight agent exposes a JSON metrics document over HTTP,
//! optionally behind a shared-secret header; this client polls it and
//! translates the document into `Resource`/`Fingerprint` values.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{PollResult, SourceClient};
use crate::identity::Fingerprint;
use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

/// Wire shape of the agent's `/metrics` document. Only the fields the
/// normalizer needs are modeled; the agent may send more (temperatures,
/// per-core detail) that this client ignores.
#[derive(Debug, Deserialize)]
struct ServerMetrics {
    system: SystemInformation,
    memory: MemoryInformation,
    cpus: CpuOverview,
}

#[derive(Debug, Deserialize)]
struct SystemInformation {
    host_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemoryInformation {
    total: u64,
    used: u64,
}

#[derive(Debug, Deserialize)]
struct CpuOverview {
    total: usize,
    average_usage: f32,
}

pub struct HostAgentClient {
    endpoint_id: String,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HostAgentClient {
    pub fn new(endpoint_id: String, base_url: String, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            base_url,
            token,
            client,
        }
    }
}

#[async_trait]
impl SourceClient for HostAgentClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let url = format!("{}/metrics", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("X-MONITORING-SECRET", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "host-agent endpoint '{}' returned {}",
                self.endpoint_id,
                response.status()
            );
        }

        let metrics: ServerMetrics = response.json().await?;
        let now = chrono::Utc::now();
        let host_name = metrics
            .system
            .host_name
            .clone()
            .unwrap_or_else(|| self.endpoint_id.clone());

        let resource = Resource {
            fingerprint: Fingerprint::for_host_agent(&host_name),
            kind: ResourceKind::Node,
            name: host_name,
            parent: None,
            capacity: Capacity {
                cpu_cores: Some(metrics.cpus.total as f64),
                memory_bytes: Some(metrics.memory.total),
                disk_bytes: None,
            },
            metrics: Metrics {
                cpu_pct: Some(metrics.cpus.average_usage as f64),
                memory_used_bytes: Some(metrics.memory.used),
                ..Default::default()
            },
            status: Status::Running,
            tags: Default::default(),
            last_seen: now,
            source_endpoint: self.endpoint_id.clone(),
        };

        Ok(vec![resource])
    }

    async fn close(&mut self) {}
}
