//! Source clients: one HTTP(S)-speaking client per polled family.
//!
//! A `SourceClient` trait implemented per family, with a `Translator` step
//! turning a family's raw response into normalized `Resource` values. The
//! Poll Scheduler owns one boxed `dyn SourceClient` per configured
//! endpoint; no runtime reflection is used to pick an implementation — the
//! registry below matches on the
//! config's `SourceKind` tag at startup, once.

pub mod docker;
pub mod host_agent;
pub mod k8s;
pub mod pbs;
pub mod pmg;
pub mod pve;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{EndpointConfig, SourceKind};
use crate::model::Resource;

/// One poll attempt's outcome: the resources currently visible at the
/// endpoint, translated and ready for the Resource Cache to merge.
pub type PollResult = anyhow::Result<Vec<Resource>>;

/// A client for one source family. Implementations hold their own HTTP
/// client and connection state; `connect` performs any handshake needed
/// before the first poll (e.g. PVE ticket auth), `poll` performs one
/// fetch-and-translate cycle, `close` releases resources on shutdown.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn connect(&mut self) -> anyhow::Result<()>;
    async fn poll(&mut self) -> PollResult;
    async fn close(&mut self);
}

/// Translates a family's raw wire representation into normalized
/// `Resource` values. Kept separate from `SourceClient` so unit tests can
/// exercise translation against fixture JSON without any HTTP client.
pub trait Translator {
    type Raw;
    fn translate(&self, endpoint_id: &str, raw: Self::Raw) -> Vec<Resource>;
}

/// Construct the right `SourceClient` for a configured endpoint. This is
/// the crate's one and only kind-dispatch point; everything downstream
/// operates on the trait object.
pub fn build_client(endpoint: &EndpointConfig, timeout: Duration) -> Box<dyn SourceClient> {
    match &endpoint.source {
        SourceKind::Pve {
            url,
            token_id,
            token_secret,
            cluster_name,
        } => Box::new(pve::PveClient::new(
            endpoint.id.clone(),
            url.clone(),
            token_id.clone(),
            token_secret.clone(),
            cluster_name.clone().unwrap_or_else(|| endpoint.id.clone()),
            timeout,
        )),
        SourceKind::Pbs {
            url,
            token_id,
            token_secret,
            instance_name,
        } => Box::new(pbs::PbsClient::new(
            endpoint.id.clone(),
            url.clone(),
            token_id.clone(),
            token_secret.clone(),
            instance_name.clone().unwrap_or_else(|| endpoint.id.clone()),
            timeout,
        )),
        SourceKind::Pmg {
            url,
            token_id,
            token_secret,
        } => Box::new(pmg::PmgClient::new(
            endpoint.id.clone(),
            url.clone(),
            token_id.clone(),
            token_secret.clone(),
            timeout,
        )),
        SourceKind::Docker { url, host_id } => Box::new(docker::DockerClient::new(
            endpoint.id.clone(),
            url.clone(),
            host_id.clone().unwrap_or_else(|| endpoint.id.clone()),
            timeout,
        )),
        SourceKind::K8s {
            kubeconfig,
            context,
            cluster_name,
        } => Box::new(k8s::K8sClient::new(
            endpoint.id.clone(),
            kubeconfig.clone(),
            context.clone(),
            cluster_name.clone().unwrap_or_else(|| endpoint.id.clone()),
            timeout,
        )),
        SourceKind::HostAgent { url, token } => Box::new(host_agent::HostAgentClient::new(
            endpoint.id.clone(),
            url.clone(),
            token.clone(),
            timeout,
        )),
    }
}
