//! Cross-source resource identity.
//!
//! A `Fingerprint` is the stable key the rest of the crate uses to refer to
//! a resource regardless of which source(s) currently report it. Derivation
//! is deterministic and kind-specific so the same physical resource always
//! yields the same fingerprint across independent polls and across sources
//! that can see the same underlying thing (e.g. a PVE node and its PBS
//! datastore are never the same fingerprint; a PVE guest and the same guest
//! seen via a second, redundant PVE endpoint are).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ResourceKind;

/// Opaque, stable identifier for a resource. Wraps a hex-encoded digest so
/// it serializes as a plain string over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct a fingerprint from its wire representation (e.g. a path
    /// or query parameter), trusting the caller rather than re-deriving it.
    pub fn from_wire(raw: &str) -> Self {
        Fingerprint(raw.to_string())
    }

    /// Derive a fingerprint from a kind and its identity-bearing fields, in
    /// the precedence order the kind defines below. Two calls with the same
    /// kind and fields always produce the same fingerprint.
    fn derive(kind: ResourceKind, parts: &[&str]) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        kind.hash_key().hash(&mut hasher);
        for part in parts {
            part.hash(&mut hasher);
        }
        Fingerprint(format!("{:016x}", hasher.finish()))
    }

    /// PVE node identity: cluster name + node name. Stable across reboots
    /// and IP changes, which a bare endpoint-address key would not be.
    pub fn for_pve_node(cluster: &str, node: &str) -> Self {
        Self::derive(ResourceKind::Node, &[cluster, node])
    }

    /// PVE guest (VM/container) identity: cluster name + VMID. VMIDs are
    /// unique within a cluster and stable across migrations between nodes.
    pub fn for_pve_guest(cluster: &str, vmid: &str, kind: ResourceKind) -> Self {
        Self::derive(kind, &[cluster, vmid])
    }

    /// PVE storage identity: cluster name + storage id + node it's scoped
    /// to (storage can be node-local or cluster-shared; shared storage
    /// uses an empty node component so all nodes resolve to one resource).
    pub fn for_pve_storage(cluster: &str, node: &str, storage_id: &str) -> Self {
        Self::derive(ResourceKind::Storage, &[cluster, node, storage_id])
    }

    /// PBS datastore identity: PBS instance name + datastore name.
    pub fn for_pbs_datastore(instance: &str, datastore: &str) -> Self {
        Self::derive(ResourceKind::PbsDatastore, &[instance, datastore])
    }

    /// Docker host identity: the endpoint's configured host id (operator
    /// supplied, since the Docker API exposes no cluster-stable name).
    pub fn for_docker_host(host_id: &str) -> Self {
        Self::derive(ResourceKind::DockerHost, &[host_id])
    }

    /// Docker container identity: host id + container id. Container ids
    /// are stable for the container's lifetime; recreation yields a new
    /// fingerprint, which is correct (it is a different resource).
    pub fn for_docker_container(host_id: &str, container_id: &str) -> Self {
        Self::derive(ResourceKind::DockerContainer, &[host_id, container_id])
    }

    /// Kubernetes node identity: cluster name + node name (Kubernetes node
    /// names are unique within a cluster by construction).
    pub fn for_k8s_node(cluster: &str, node: &str) -> Self {
        Self::derive(ResourceKind::K8sNode, &[cluster, node])
    }

    /// Kubernetes pod identity: cluster name + namespace + pod name + UID.
    /// The UID is included because a namespace/name pair is reused across
    /// pod restarts under a Deployment; the UID disambiguates episodes.
    pub fn for_k8s_pod(cluster: &str, namespace: &str, name: &str, uid: &str) -> Self {
        Self::derive(ResourceKind::K8sPod, &[cluster, namespace, name, uid])
    }

    /// Host-agent identity: the agent-reported stable host id, falling back
    /// to the configured endpoint address if the agent provides none.
    pub fn for_host_agent(host_id: &str) -> Self {
        Self::derive(ResourceKind::Node, &["host-agent", host_id])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceKind {
    fn hash_key(self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Vm => "vm",
            ResourceKind::Container => "container",
            ResourceKind::Storage => "storage",
            ResourceKind::PbsDatastore => "pbs_datastore",
            ResourceKind::DockerHost => "docker_host",
            ResourceKind::DockerContainer => "docker_container",
            ResourceKind::K8sNode => "k8s_node",
            ResourceKind::K8sPod => "k8s_pod",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_fingerprint() {
        let a = Fingerprint::for_pve_node("prod", "pve1");
        let b = Fingerprint::for_pve_node("prod", "pve1");
        assert_eq!(a, b);
    }

    #[test]
    fn different_kinds_do_not_collide() {
        let node = Fingerprint::for_pve_node("prod", "100");
        let vm = Fingerprint::for_pve_guest("prod", "100", ResourceKind::Vm);
        assert_ne!(node, vm);
    }

    #[test]
    fn vm_and_container_with_same_vmid_do_not_collide() {
        let vm = Fingerprint::for_pve_guest("prod", "100", ResourceKind::Vm);
        let ct = Fingerprint::for_pve_guest("prod", "100", ResourceKind::Container);
        assert_ne!(vm, ct);
    }

    #[test]
    fn pmg_gets_no_special_folding_helper() {
        // PMG resources are represented only via endpoint health, not as
        // Resource values, so there is intentionally no `for_pmg_*` here.
        let _ = ResourceKind::Node;
    }
}
