//! Proxmox VE source client.
//!
//! Polls a PVE API endpoint's cluster resource list and translates nodes,
//! guests (VMs/containers) and storage into `Resource` values, via a
//! reqwest client carrying an optional bearer-style API token header
//! against the PVE `cluster/resources` API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{instrument, warn};

use super::{PollResult, SourceClient, Translator};
use crate::identity::Fingerprint;
use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

#[derive(Debug, Deserialize)]
struct PveResourceEntry {
    #[serde(rename = "type")]
    entry_type: String,
    node: Option<String>,
    vmid: Option<u64>,
    name: Option<String>,
    storage: Option<String>,
    status: Option<String>,
    maxcpu: Option<f64>,
    maxmem: Option<u64>,
    maxdisk: Option<u64>,
    mem: Option<u64>,
    disk: Option<u64>,
    cpu: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PveResourcesResponse {
    data: Vec<PveResourceEntry>,
}

pub struct PveClient {
    endpoint_id: String,
    base_url: String,
    token_id: Option<String>,
    token_secret: Option<String>,
    cluster_name: String,
    client: reqwest::Client,
}

impl PveClient {
    pub fn new(
        endpoint_id: String,
        base_url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
        cluster_name: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(false)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            base_url,
            token_id,
            token_secret,
            cluster_name,
            client,
        }
    }

    fn auth_header(&self) -> Option<String> {
        match (&self.token_id, &self.token_secret) {
            (Some(id), Some(secret)) => Some(format!("PVEAPIToken={id}={secret}")),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceClient for PveClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let url = format!("{}/api2/json/cluster/resources", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("PVE endpoint '{}' returned {}", self.endpoint_id, response.status());
        }

        let parsed: PveResourcesResponse = response.json().await.inspect_err(|e| {
            warn!(endpoint = %self.endpoint_id, error = %e, "failed to parse PVE response");
        })?;

        Ok(self.translate(&self.endpoint_id, parsed))
    }

    async fn close(&mut self) {}
}

impl Translator for PveClient {
    type Raw = PveResourcesResponse;

    fn translate(&self, endpoint_id: &str, raw: Self::Raw) -> Vec<Resource> {
        let now = chrono::Utc::now();
        raw.data
            .into_iter()
            .filter_map(|entry| {
                let status = match entry.status.as_deref() {
                    Some("running") => Status::Running,
                    Some("stopped") => Status::Stopped,
                    Some("paused") => Status::Paused,
                    _ => Status::Unknown,
                };
                let metrics = Metrics {
                    cpu_pct: entry.cpu.map(|c| c * 100.0),
                    memory_used_bytes: entry.mem,
                    disk_used_bytes: entry.disk,
                    ..Default::default()
                };
                let capacity = Capacity {
                    cpu_cores: entry.maxcpu,
                    memory_bytes: entry.maxmem,
                    disk_bytes: entry.maxdisk,
                };

                match entry.entry_type.as_str() {
                    "node" => {
                        let node = entry.node?;
                        Some(Resource {
                            fingerprint: Fingerprint::for_pve_node(&self.cluster_name, &node),
                            kind: ResourceKind::Node,
                            name: node,
                            parent: None,
                            capacity,
                            metrics,
                            status,
                            tags: Default::default(),
                            last_seen: now,
                            source_endpoint: endpoint_id.to_string(),
                        })
                    }
                    "qemu" | "lxc" => {
                        let vmid = entry.vmid?.to_string();
                        let kind = if entry.entry_type == "qemu" {
                            ResourceKind::Vm
                        } else {
                            ResourceKind::Container
                        };
                        let parent = entry
                            .node
                            .as_ref()
                            .map(|n| Fingerprint::for_pve_node(&self.cluster_name, n));
                        Some(Resource {
                            fingerprint: Fingerprint::for_pve_guest(&self.cluster_name, &vmid, kind),
                            kind,
                            name: entry.name.unwrap_or(vmid),
                            parent,
                            capacity,
                            metrics,
                            status,
                            tags: Default::default(),
                            last_seen: now,
                            source_endpoint: endpoint_id.to_string(),
                        })
                    }
                    "storage" => {
                        let node = entry.node.unwrap_or_default();
                        let storage_id = entry.storage?;
                        Some(Resource {
                            fingerprint: Fingerprint::for_pve_storage(
                                &self.cluster_name,
                                &node,
                                &storage_id,
                            ),
                            kind: ResourceKind::Storage,
                            name: storage_id,
                            parent: Some(Fingerprint::for_pve_node(&self.cluster_name, &node)),
                            capacity,
                            metrics,
                            status: Status::Unknown,
                            tags: Default::default(),
                            last_seen: now,
                            source_endpoint: endpoint_id.to_string(),
                        })
                    }
                    _ => None,
                }
            })
            .collect()
    }
}
