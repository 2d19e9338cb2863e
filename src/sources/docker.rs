//! Docker source client.
//!
//! Polls the Docker Engine API (`/containers/json`) over the configured
//! base URL (a TCP or Unix-socket-proxied HTTP endpoint) and translates
//! the host itself plus each container into `Resource` values.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{PollResult, SourceClient, Translator};
use crate::identity::Fingerprint;
use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

#[derive(Debug, Deserialize)]
struct DockerContainerEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names")]
    names: Vec<String>,
    #[serde(rename = "State")]
    state: String,
}

pub struct DockerClient {
    endpoint_id: String,
    base_url: String,
    host_id: String,
    client: reqwest::Client,
}

impl DockerClient {
    pub fn new(endpoint_id: String, base_url: String, host_id: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            base_url,
            host_id,
            client,
        }
    }
}

#[async_trait]
impl SourceClient for DockerClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let url = format!("{}/containers/json?all=true", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Docker endpoint '{}' returned {}",
                self.endpoint_id,
                response.status()
            );
        }
        let entries: Vec<DockerContainerEntry> = response.json().await?;
        Ok(self.translate(&self.endpoint_id, entries))
    }

    async fn close(&mut self) {}
}

impl Translator for DockerClient {
    type Raw = Vec<DockerContainerEntry>;

    fn translate(&self, endpoint_id: &str, raw: Self::Raw) -> Vec<Resource> {
        let now = chrono::Utc::now();
        let host_fp = Fingerprint::for_docker_host(&self.host_id);

        let mut resources = vec![Resource {
            fingerprint: host_fp.clone(),
            kind: ResourceKind::DockerHost,
            name: self.host_id.clone(),
            parent: None,
            capacity: Capacity::default(),
            metrics: Metrics::default(),
            status: Status::Running,
            tags: Default::default(),
            last_seen: now,
            source_endpoint: endpoint_id.to_string(),
        }];

        resources.extend(raw.into_iter().map(|entry| {
            let status = match entry.state.as_str() {
                "running" => Status::Running,
                "paused" => Status::Paused,
                "exited" | "dead" | "created" => Status::Stopped,
                _ => Status::Unknown,
            };
            let name = entry
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| entry.id.clone());

            Resource {
                fingerprint: Fingerprint::for_docker_container(&self.host_id, &entry.id),
                kind: ResourceKind::DockerContainer,
                name,
                parent: Some(host_fp.clone()),
                capacity: Capacity::default(),
                metrics: Metrics::default(),
                status,
                tags: Default::default(),
                last_seen: now,
                source_endpoint: endpoint_id.to_string(),
            }
        }));

        resources
    }
}
