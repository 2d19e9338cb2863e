//! Resource Normalizer & Identity: the Resource Cache actor.
//!
//! Subscribes to the Poll Scheduler's broadcast channel, merges each
//! poll's resources into an in-memory table keyed by fingerprint (merge
//! policy in `merge.rs`), republishes a `ResourceDelta` per tick, and
//! periodically sweeps for resources that have gone stale or should be
//! removed.

pub mod merge;

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::identity::Fingerprint;
use crate::model::Resource;
use crate::scheduler::messages::PollEvent;

/// A batch of resources that changed (inserted/updated) plus fingerprints
/// that were removed (went stale past the removal grace period), published
/// after every merge so the Snapshot Publisher can incrementally update.
#[derive(Debug, Clone, Default)]
pub struct ResourceDelta {
    pub upserted: Vec<Resource>,
    pub removed: Vec<Fingerprint>,
}

enum Command {
    Snapshot(oneshot::Sender<Vec<Resource>>),
    Shutdown,
}

pub struct ResourceCacheActor {
    resources: HashMap<Fingerprint, Resource>,
    poll_rx: broadcast::Receiver<PollEvent>,
    command_rx: mpsc::Receiver<Command>,
    delta_tx: broadcast::Sender<ResourceDelta>,
    staleness: chrono::Duration,
    removal_grace: chrono::Duration,
}

impl ResourceCacheActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            tokio::select! {
                event = self.poll_rx.recv() => {
                    match event {
                        Ok(event) => self.handle_poll_event(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "resource cache lagged behind poll scheduler");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        Command::Snapshot(reply) => {
                            let _ = reply.send(self.resources.values().cloned().collect());
                        }
                        Command::Shutdown => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_stale();
                }
            }
        }
        debug!("resource cache shut down");
    }

    fn handle_poll_event(&mut self, event: PollEvent) {
        let mut delta = ResourceDelta::default();
        for resource in event.resources {
            let fingerprint = resource.fingerprint.clone();
            let merged = merge::merge(self.resources.get(&fingerprint), resource);
            self.resources.insert(fingerprint, merged.clone());
            delta.upserted.push(merged);
        }
        if !delta.upserted.is_empty() {
            let _ = self.delta_tx.send(delta);
        }
    }

    /// Resources not seen within `staleness` are marked stale by the
    /// Snapshot Publisher (via `last_seen` age, computed on read); this
    /// sweep only removes entries once they pass the longer
    /// `removal_grace` window, so a resource that briefly flickers off
    /// does not disappear from the API immediately.
    fn sweep_stale(&mut self) {
        let now = chrono::Utc::now();
        let cutoff = now - self.removal_grace;
        let expired: Vec<Fingerprint> = self
            .resources
            .iter()
            .filter(|(_, r)| r.last_seen < cutoff)
            .map(|(fp, _)| fp.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        for fp in &expired {
            self.resources.remove(fp);
        }
        let _ = self.delta_tx.send(ResourceDelta {
            upserted: Vec::new(),
            removed: expired,
        });
    }
}

#[derive(Clone)]
pub struct ResourceCacheHandle {
    command_tx: mpsc::Sender<Command>,
    pub deltas: broadcast::Sender<ResourceDelta>,
}

impl ResourceCacheHandle {
    pub fn spawn(
        poll_rx: broadcast::Receiver<PollEvent>,
        staleness_seconds: u64,
        removal_grace_seconds: u64,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (delta_tx, _) = broadcast::channel(256);
        let actor = ResourceCacheActor {
            resources: HashMap::new(),
            poll_rx,
            command_rx,
            delta_tx: delta_tx.clone(),
            staleness: chrono::Duration::seconds(staleness_seconds as i64),
            removal_grace: chrono::Duration::seconds(removal_grace_seconds as i64),
        };
        tokio::spawn(actor.run());
        Self {
            command_tx,
            deltas: delta_tx,
        }
    }

    pub async fn snapshot(&self) -> Vec<Resource> {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(Command::Snapshot(tx)).await.is_ok() {
            rx.await.unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}

/// Whether a resource's `last_seen` is old enough to be reported stale to
/// API clients (but not yet old enough to be dropped from the cache).
pub fn is_stale(resource: &Resource, staleness_seconds: u64, now: chrono::DateTime<chrono::Utc>) -> bool {
    now - resource.last_seen > chrono::Duration::seconds(staleness_seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capacity, Metrics, ResourceKind, Status};

    fn resource(last_seen: chrono::DateTime<chrono::Utc>) -> Resource {
        Resource {
            fingerprint: Fingerprint::for_pve_node("c", "n"),
            kind: ResourceKind::Node,
            name: "n".into(),
            parent: None,
            capacity: Capacity::default(),
            metrics: Metrics::default(),
            status: Status::Running,
            tags: Default::default(),
            last_seen,
            source_endpoint: "e".into(),
        }
    }

    #[test]
    fn freshly_seen_resource_is_not_stale() {
        let r = resource(chrono::Utc::now());
        assert!(!is_stale(&r, 90, chrono::Utc::now()));
    }

    #[test]
    fn old_resource_is_stale() {
        let r = resource(chrono::Utc::now() - chrono::Duration::seconds(200));
        assert!(is_stale(&r, 90, chrono::Utc::now()));
    }
}
