//! Assembling a `GET /api/state` / `WS /ws` `state` payload out of the
//! Resource Cache's flat fingerprint-keyed table and the Alert Engine's
//! active episodes, into `{nodes, guests, storage, backups,
//! alerts.active}` shape.

use serde::Serialize;

use crate::alerts::state::Episode;
use crate::model::{Resource, ResourceKind};

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub nodes: Vec<Resource>,
    pub guests: Vec<Resource>,
    pub storage: Vec<Resource>,
    pub backups: Vec<Resource>,
    pub alerts_active: Vec<Episode>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Bucket resources into the four sections the UI expects. A resource kind
/// maps to exactly one bucket; PMG contributes to none of them.
pub fn partition(resources: impl IntoIterator<Item = Resource>) -> (Vec<Resource>, Vec<Resource>, Vec<Resource>, Vec<Resource>) {
    let mut nodes = Vec::new();
    let mut guests = Vec::new();
    let mut storage = Vec::new();
    let mut backups = Vec::new();

    for resource in resources {
        match resource.kind {
            ResourceKind::Node | ResourceKind::DockerHost | ResourceKind::K8sNode => nodes.push(resource),
            ResourceKind::Vm | ResourceKind::Container | ResourceKind::DockerContainer | ResourceKind::K8sPod => {
                guests.push(resource)
            }
            ResourceKind::Storage => storage.push(resource),
            ResourceKind::PbsDatastore => backups.push(resource),
        }
    }

    (nodes, guests, storage, backups)
}

pub fn build(resources: impl IntoIterator<Item = Resource>, alerts_active: Vec<Episode>, generated_at: chrono::DateTime<chrono::Utc>) -> StateSnapshot {
    let (nodes, guests, storage, backups) = partition(resources);
    StateSnapshot {
        nodes,
        guests,
        storage,
        backups,
        alerts_active,
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;
    use crate::model::{Capacity, Metrics, Status};

    fn resource(kind: ResourceKind) -> Resource {
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
    fn partitions_each_kind_into_its_section() {
        let resources = vec![
            resource(ResourceKind::Node),
            resource(ResourceKind::Vm),
            resource(ResourceKind::Storage),
            resource(ResourceKind::PbsDatastore),
            resource(ResourceKind::K8sPod),
        ];
        let (nodes, guests, storage, backups) = partition(resources);
        assert_eq!(nodes.len(), 1);
        assert_eq!(guests.len(), 2);
        assert_eq!(storage.len(), 1);
        assert_eq!(backups.len(), 1);
    }
}
