//! Event Bus / Snapshot Publisher.
//!
//! Subscribes to both `ResourceDelta` (from the Resource Cache) and
//! `AlertEvent` (from the Alert Engine) and republishes `WsMessage`s for
//! every connected WebSocket client (`api/websocket.rs`), computing
//! incremental `state` payloads so unchanged resources are not re-sent
//! every tick.

pub mod snapshot;

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::alerts::state::{AlertId, Episode};
use crate::alerts::AlertEvent;
use crate::identity::Fingerprint;
use crate::model::Resource;
use crate::normalize::ResourceDelta;
use snapshot::StateSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsMessage {
    State { full: bool, payload: StateSnapshot },
    Alert { payload: Episode },
    AlertResolved { payload: Episode },
    AlertAcknowledged { payload: Episode },
    /// One coalesced notice per storm-mode flush instead of one `Alert`
    /// per episode, carrying a human-readable `N alerts for M resources`
    /// summary plus the episode count so a client can still reconcile.
    AlertStorm { summary: String, alert_count: usize, resource_count: usize },
    ConfigurationReloaded,
}

enum Command {
    FullSnapshot(oneshot::Sender<StateSnapshot>),
    Shutdown,
}

pub struct EventBusActor {
    resources: HashMap<Fingerprint, Resource>,
    alerts_active: HashMap<AlertId, Episode>,
    delta_rx: broadcast::Receiver<ResourceDelta>,
    alert_rx: broadcast::Receiver<AlertEvent>,
    command_rx: mpsc::Receiver<Command>,
    ws_tx: broadcast::Sender<WsMessage>,
}

impl EventBusActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                delta = self.delta_rx.recv() => {
                    match delta {
                        Ok(delta) => self.handle_delta(delta),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "event bus lagged behind resource cache");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                event = self.alert_rx.recv() => {
                    match event {
                        Ok(event) => self.handle_alert_event(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "event bus lagged behind alert engine");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        Command::FullSnapshot(reply) => {
                            let _ = reply.send(self.full_snapshot());
                        }
                        Command::Shutdown => break,
                    }
                }
            }
        }
        debug!("event bus shut down");
    }

    fn handle_delta(&mut self, delta: ResourceDelta) {
        if delta.upserted.is_empty() && delta.removed.is_empty() {
            return;
        }
        for resource in &delta.upserted {
            self.resources.insert(resource.fingerprint.clone(), resource.clone());
        }
        for fingerprint in &delta.removed {
            self.resources.remove(fingerprint);
        }

        let payload = snapshot::build(delta.upserted, self.alerts_active.values().cloned().collect(), chrono::Utc::now());
        let _ = self.ws_tx.send(WsMessage::State { full: false, payload });
    }

    fn handle_alert_event(&mut self, event: AlertEvent) {
        match event {
            AlertEvent::Triggered(episode) => {
                self.alerts_active.insert(episode.id.clone(), episode.clone());
                let _ = self.ws_tx.send(WsMessage::Alert { payload: episode });
            }
            AlertEvent::Resolved(episode) => {
                self.alerts_active.remove(&episode.id);
                let _ = self.ws_tx.send(WsMessage::AlertResolved { payload: episode });
            }
            AlertEvent::Acknowledged(episode) => {
                self.alerts_active.insert(episode.id.clone(), episode.clone());
                let _ = self.ws_tx.send(WsMessage::AlertAcknowledged { payload: episode });
            }
            AlertEvent::StormStarted => {
                debug!("alert storm started");
            }
            AlertEvent::StormSummary { episodes, resource_count } => {
                let alert_count = episodes.len();
                for episode in episodes {
                    self.alerts_active.insert(episode.id.clone(), episode);
                }
                debug!(alert_count, resource_count, "coalesced alert storm summary");
                let _ = self.ws_tx.send(WsMessage::AlertStorm {
                    summary: format!("{alert_count} alerts for {resource_count} resources"),
                    alert_count,
                    resource_count,
                });
            }
            AlertEvent::StormEnded => {
                debug!("alert storm ended");
            }
        }
    }

    fn full_snapshot(&self) -> StateSnapshot {
        snapshot::build(
            self.resources.values().cloned(),
            self.alerts_active.values().cloned().collect(),
            chrono::Utc::now(),
        )
    }
}

#[derive(Clone)]
pub struct EventBusHandle {
    command_tx: mpsc::Sender<Command>,
    pub messages: broadcast::Sender<WsMessage>,
}

impl EventBusHandle {
    pub fn spawn(delta_rx: broadcast::Receiver<ResourceDelta>, alert_rx: broadcast::Receiver<AlertEvent>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (ws_tx, _) = broadcast::channel(64);
        let actor = EventBusActor {
            resources: HashMap::new(),
            alerts_active: HashMap::new(),
            delta_rx,
            alert_rx,
            command_rx,
            ws_tx: ws_tx.clone(),
        };
        tokio::spawn(actor.run());
        Self {
            command_tx,
            messages: ws_tx,
        }
    }

    /// Used both by `GET /api/state` and by a WebSocket client's initial
    /// frame / `requestData` re-sync request.
    pub async fn full_snapshot(&self) -> StateSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(Command::FullSnapshot(reply)).await.is_ok() {
            rx.await.unwrap_or_else(|_| snapshot::build(Vec::new(), Vec::new(), chrono::Utc::now()))
        } else {
            snapshot::build(Vec::new(), Vec::new(), chrono::Utc::now())
        }
    }

    pub fn publish_configuration_reloaded(&self) {
        let _ = self.messages.send(WsMessage::ConfigurationReloaded);
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}
