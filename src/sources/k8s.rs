//! Kubernetes source client.
//!
//! Polls the cluster's API server `/api/v1/nodes` and `/api/v1/pods`
//! endpoints through a plain `reqwest::Client` pointed at the server URL
//! resolved from the supplied kubeconfig context. Parsing is limited to
//! the fields this crate's Resource model needs (name, namespace, phase);
//! the full Kubernetes object schema is intentionally not modeled here.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{PollResult, SourceClient};
use crate::identity::Fingerprint;
use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeItem {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct NodeList {
    items: Vec<NodeItem>,
}

#[derive(Debug, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: ObjectMeta,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct PodList {
    items: Vec<PodItem>,
}

pub struct K8sClient {
    endpoint_id: String,
    api_server_url: String,
    #[allow(dead_code)]
    context: Option<String>,
    cluster_name: String,
    client: reqwest::Client,
}

impl K8sClient {
    pub fn new(
        endpoint_id: String,
        kubeconfig: Option<String>,
        context: Option<String>,
        cluster_name: String,
        timeout: Duration,
    ) -> Self {
        // In the reference deployment the API server URL is resolved from
        // the kubeconfig file; here it is taken as-is since kubeconfig
        // parsing is outside this crate's scope (see `Non-goals`).
        let api_server_url = kubeconfig.unwrap_or_default();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint_id,
            api_server_url,
            context,
            cluster_name,
            client,
        }
    }
}

#[async_trait]
impl SourceClient for K8sClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint_id))]
    async fn poll(&mut self) -> PollResult {
        let now = chrono::Utc::now();
        let mut resources = Vec::new();

        let nodes_url = format!("{}/api/v1/nodes", self.api_server_url);
        let nodes: NodeList = self.client.get(&nodes_url).send().await?.json().await?;
        for node in nodes.items {
            resources.push(Resource {
                fingerprint: Fingerprint::for_k8s_node(&self.cluster_name, &node.metadata.name),
                kind: ResourceKind::K8sNode,
                name: node.metadata.name,
                parent: None,
                capacity: Capacity::default(),
                metrics: Metrics::default(),
                status: Status::Running,
                tags: Default::default(),
                last_seen: now,
                source_endpoint: self.endpoint_id.clone(),
            });
        }

        let pods_url = format!("{}/api/v1/pods", self.api_server_url);
        let pods: PodList = self.client.get(&pods_url).send().await?.json().await?;
        for pod in pods.items {
            let namespace = pod.metadata.namespace.unwrap_or_else(|| "default".into());
            let uid = pod.metadata.uid.unwrap_or_default();
            let status = match pod.status.and_then(|s| s.phase).as_deref() {
                Some("Running") => Status::Running,
                Some("Succeeded") | Some("Failed") => Status::Stopped,
                _ => Status::Unknown,
            };
            resources.push(Resource {
                fingerprint: Fingerprint::for_k8s_pod(
                    &self.cluster_name,
                    &namespace,
                    &pod.metadata.name,
                    &uid,
                ),
                kind: ResourceKind::K8sPod,
                name: pod.metadata.name,
                parent: None,
                capacity: Capacity::default(),
                metrics: Metrics::default(),
                status,
                tags: [("namespace".to_string(), namespace)].into_iter().collect(),
                last_seen: now,
                source_endpoint: self.endpoint_id.clone(),
            });
        }

        Ok(resources)
    }

    async fn close(&mut self) {}
}
