//! Merge policy for resources seen from more than one source.
//!
//! Prefer the control-plane source for live metrics, the backup
//! source for backup metadata, and take `lastSeen = max(old, new)`. This
//! crate has no backup-job resource kind of its own (backup metadata lives
//! entirely in `PbsDatastore` capacity/usage), so "backup source" here
//! specializes to: a `PbsDatastore` reading never overwrites a live-metric
//! field that a control-plane (PVE/Docker/K8s/host-agent) reading already
//! populated, and vice versa for disk-usage fields a datastore is
//! authoritative for.

use crate::model::{Capacity, Metrics, Resource, ResourceKind};

fn is_control_plane(kind: ResourceKind) -> bool {
    !matches!(kind, ResourceKind::PbsDatastore)
}

fn merge_capacity(old: &Capacity, new: &Capacity) -> Capacity {
    Capacity {
        cpu_cores: new.cpu_cores.or(old.cpu_cores),
        memory_bytes: new.memory_bytes.or(old.memory_bytes),
        disk_bytes: new.disk_bytes.or(old.disk_bytes),
    }
}

fn merge_metrics(old: &Metrics, new: &Metrics, new_is_control_plane: bool) -> Metrics {
    // A control-plane reading always supersedes a stale value outright; a
    // non-control-plane (backup) reading only fills in gaps so it never
    // clobbers fresher live metrics with backup-side placeholders.
    if new_is_control_plane {
        Metrics {
            cpu_pct: new.cpu_pct.or(old.cpu_pct),
            memory_used_bytes: new.memory_used_bytes.or(old.memory_used_bytes),
            disk_used_bytes: new.disk_used_bytes.or(old.disk_used_bytes),
            disk_read_bytes_per_sec: new.disk_read_bytes_per_sec.or(old.disk_read_bytes_per_sec),
            disk_write_bytes_per_sec: new.disk_write_bytes_per_sec.or(old.disk_write_bytes_per_sec),
            net_rx_bytes_per_sec: new.net_rx_bytes_per_sec.or(old.net_rx_bytes_per_sec),
            net_tx_bytes_per_sec: new.net_tx_bytes_per_sec.or(old.net_tx_bytes_per_sec),
        }
    } else {
        Metrics {
            cpu_pct: old.cpu_pct.or(new.cpu_pct),
            memory_used_bytes: old.memory_used_bytes.or(new.memory_used_bytes),
            disk_used_bytes: new.disk_used_bytes.or(old.disk_used_bytes),
            disk_read_bytes_per_sec: old.disk_read_bytes_per_sec.or(new.disk_read_bytes_per_sec),
            disk_write_bytes_per_sec: old.disk_write_bytes_per_sec.or(new.disk_write_bytes_per_sec),
            net_rx_bytes_per_sec: old.net_rx_bytes_per_sec.or(new.net_rx_bytes_per_sec),
            net_tx_bytes_per_sec: old.net_tx_bytes_per_sec.or(new.net_tx_bytes_per_sec),
        }
    }
}

/// Merge a freshly-polled `Resource` into the cached entry for the same
/// fingerprint, if one exists. Returns the resource to store.
pub fn merge(old: Option<&Resource>, new: Resource) -> Resource {
    let Some(old) = old else { return new };

    let new_is_control_plane = is_control_plane(new.kind);
    let mut tags = old.tags.clone();
    tags.extend(new.tags.clone());

    Resource {
        fingerprint: new.fingerprint,
        kind: new.kind,
        name: if new.name.is_empty() { old.name.clone() } else { new.name },
        parent: new.parent.or_else(|| old.parent.clone()),
        capacity: merge_capacity(&old.capacity, &new.capacity),
        metrics: merge_metrics(&old.metrics, &new.metrics, new_is_control_plane),
        status: new.status,
        tags,
        last_seen: old.last_seen.max(new.last_seen),
        source_endpoint: new.source_endpoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;
    use crate::model::Status;

    fn base(kind: ResourceKind) -> Resource {
        Resource {
            fingerprint: Fingerprint::for_pve_node("c", "n"),
            kind,
            name: "n".into(),
            parent: None,
            capacity: Capacity::default(),
            metrics: Metrics::default(),
            status: Status::Running,
            tags: Default::default(),
            last_seen: chrono::Utc::now(),
            source_endpoint: "e".into(),
        }
    }

    #[test]
    fn last_seen_takes_the_max() {
        let mut old = base(ResourceKind::Node);
        old.last_seen = chrono::Utc::now() - chrono::Duration::seconds(60);
        let new = base(ResourceKind::Node);
        let merged = merge(Some(&old), new.clone());
        assert_eq!(merged.last_seen, new.last_seen);
    }

    #[test]
    fn control_plane_metric_overwrites_stale_value() {
        let mut old = base(ResourceKind::Node);
        old.metrics.cpu_pct = Some(10.0);
        let mut new = base(ResourceKind::Node);
        new.metrics.cpu_pct = Some(20.0);
        let merged = merge(Some(&old), new);
        assert_eq!(merged.metrics.cpu_pct, Some(20.0));
    }

    #[test]
    fn backup_source_does_not_clobber_live_cpu() {
        let mut old = base(ResourceKind::Node);
        old.metrics.cpu_pct = Some(10.0);
        let mut new = base(ResourceKind::PbsDatastore);
        new.metrics.cpu_pct = None;
        new.metrics.disk_used_bytes = Some(500);
        let merged = merge(Some(&old), new);
        assert_eq!(merged.metrics.cpu_pct, Some(10.0));
        assert_eq!(merged.metrics.disk_used_bytes, Some(500));
    }
}
