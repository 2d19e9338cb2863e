//! Resource data model shared across sources, the normalizer, and the API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::identity::Fingerprint;

/// The kind of resource a source can report. Each kind maps to a distinct
/// identity derivation rule in `crate::identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Node,
    Vm,
    Container,
    Storage,
    PbsDatastore,
    DockerHost,
    DockerContainer,
    K8sNode,
    K8sPod,
}

/// Static-ish capacity figures for a resource. Fields are optional because
/// not every kind reports every figure (e.g. a docker container has no
/// `disk_bytes` of its own).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu_cores: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub disk_bytes: Option<u64>,
}

/// A point-in-time set of metric readings for a resource. Fields mirror the
/// four tiers' underlying raw metric names in `crate::metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_pct: Option<f64>,
    pub memory_used_bytes: Option<u64>,
    pub disk_used_bytes: Option<u64>,
    pub disk_read_bytes_per_sec: Option<f64>,
    pub disk_write_bytes_per_sec: Option<f64>,
    pub net_rx_bytes_per_sec: Option<f64>,
    pub net_tx_bytes_per_sec: Option<f64>,
}

/// Operational status of a resource as reported by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Running,
    Stopped,
    Paused,
    Unknown,
}

/// A normalized resource, the unit the Resource Cache stores and the
/// Snapshot Publisher serializes into `GET /api/state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub fingerprint: Fingerprint,
    pub kind: ResourceKind,
    pub name: String,
    pub parent: Option<Fingerprint>,
    pub capacity: Capacity,
    pub metrics: Metrics,
    pub status: Status,
    pub tags: HashMap<String, String>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub source_endpoint: String,
}

/// A single stored reading: `(timestamp, value)`. The Metrics Store keys a
/// series by `(fingerprint, metric_name, tier)` and appends samples of this
/// shape.
pub type Sample = (chrono::DateTime<chrono::Utc>, f64);
