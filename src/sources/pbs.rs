//! Proxmox Backup Server source client.
//!
//! Polls datastore usage. Backup metadata (job history) is out of this
//! crate's Resource model; only per-datastore capacity/usage is tracked,
//! consistent with the `PbsDatastore` resource kind.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{PollResult, SourceClient, Translator};
use crate::identity::Fingerprint;
use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

#[derive(Debug, Deserialize)]
struct PbsDatastoreEntry {
    store: String,
    total: Option<u64>,
    used: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PbsDatastoreResponse {
    data: Vec<PbsDatastoreEntry>,
}

pub struct PbsClient {
    endpoint_id: String,
    base_url: String,
    token_id: Option<String>,
    token_secret: Option<String>,
    instance_name: String,
    client: reqwest::Client,
}

impl PbsClient {
    pub fn new(
        endpoint_id: String,
        base_url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
        instance_name: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            base_url,
            token_id,
            token_secret,
            instance_name,
            client,
        }
    }

    fn auth_header(&self) -> Option<String> {
        match (&self.token_id, &self.token_secret) {
            (Some(id), Some(secret)) => Some(format!("PBSAPIToken={id}={secret}")),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceClient for PbsClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let url = format!("{}/api2/json/status/datastore-usage", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("PBS endpoint '{}' returned {}", self.endpoint_id, response.status());
        }
        let parsed: PbsDatastoreResponse = response.json().await?;
        Ok(self.translate(&self.endpoint_id, parsed))
    }

    async fn close(&mut self) {}
}

impl Translator for PbsClient {
    type Raw = PbsDatastoreResponse;

    fn translate(&self, endpoint_id: &str, raw: Self::Raw) -> Vec<Resource> {
        let now = chrono::Utc::now();
        raw.data
            .into_iter()
            .map(|entry| Resource {
                fingerprint: Fingerprint::for_pbs_datastore(&self.instance_name, &entry.store),
                kind: ResourceKind::PbsDatastore,
                name: entry.store,
                parent: None,
                capacity: Capacity {
                    cpu_cores: None,
                    memory_bytes: None,
                    disk_bytes: entry.total,
                },
                metrics: Metrics {
                    disk_used_bytes: entry.used,
                    ..Default::default()
                },
                status: Status::Unknown,
                tags: Default::default(),
                last_seen: now,
                source_endpoint: endpoint_id.to_string(),
            })
            .collect()
    }
}
