//! Alert Engine.
//!
//! A rule-driven engine: subscribes to Resource Cache deltas, evaluates
//! every configured `AlertRuleConfig` against every resource reported,
//! drives episodes through the phase state machine in `state.rs`,
//! coalesces rapid activations via `storm.rs`, answers queries over a
//! oneshot channel, and persists
//! active episodes via `persistence.rs` for restart recovery.

pub mod persistence;
pub mod rules;
pub mod state;
pub mod storm;

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::config::{AlertOverrideConfig, AlertRuleConfig, AlertsConfig};
use crate::identity::Fingerprint;
use crate::normalize::ResourceDelta;
use rules::effective_rules_for;
use state::{AlertId, Episode, Phase, Transition};
use storm::StormDetector;

#[derive(Debug, Clone)]
pub enum AlertEvent {
    Triggered(Episode),
    Resolved(Episode),
    Acknowledged(Episode),
    StormStarted,
    /// Coalesced replacement for individual `Triggered` events while in
    /// storm mode: the `episodes` that triggered across `resource_count`
    /// distinct resources since the last summary (`episodes.len()` is the
    /// alert count), emitted at most twice a second so subscribers still
    /// see one message per interval instead of one per episode.
    StormSummary {
        episodes: Vec<Episode>,
        resource_count: usize,
    },
    StormEnded,
}

enum Command {
    Acknowledge {
        id: AlertId,
        reply: oneshot::Sender<bool>,
    },
    Suppress {
        fingerprint: Fingerprint,
        rule_name: String,
        until: chrono::DateTime<chrono::Utc>,
    },
    GetActive(oneshot::Sender<Vec<Episode>>),
    ReloadRules {
        rules: Vec<AlertRuleConfig>,
        overrides: HashMap<String, AlertOverrideConfig>,
    },
    Shutdown,
}

pub struct AlertEngineActor {
    episodes: HashMap<(Fingerprint, String), Episode>,
    suppressions: HashMap<(Fingerprint, String), chrono::DateTime<chrono::Utc>>,
    rules: Vec<AlertRuleConfig>,
    overrides: HashMap<String, AlertOverrideConfig>,
    config: AlertsConfig,
    delta_rx: broadcast::Receiver<ResourceDelta>,
    command_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<AlertEvent>,
    storm: StormDetector,
    /// Episodes triggered while in storm mode, coalesced into a single
    /// `StormSummary` at most twice a second instead of being forwarded
    /// individually.
    storm_buffer: Vec<Episode>,
}

impl AlertEngineActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        if let Ok(loaded) = persistence::load(&self.config.state_path) {
            for episode in loaded {
                self.episodes.insert((episode.fingerprint.clone(), episode.rule_name.clone()), episode);
            }
            info!(count = self.episodes.len(), "restored alert episodes from disk");
        }

        let mut persist_tick = tokio::time::interval(std::time::Duration::from_secs(30));
        // Storm summaries are coalesced "at most twice per second" (§4.4);
        // a 500ms tick both checks for storm exit and flushes the buffer.
        let mut storm_tick = tokio::time::interval(std::time::Duration::from_millis(500));

        loop {
            tokio::select! {
                delta = self.delta_rx.recv() => {
                    match delta {
                        Ok(delta) => self.handle_delta(delta),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "alert engine lagged behind resource cache");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(cmd) = self.command_rx.recv() => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                _ = persist_tick.tick() => {
                    self.persist();
                }
                _ = storm_tick.tick() => {
                    self.flush_storm_buffer();
                    if self.storm.tick(chrono::Utc::now()) {
                        let _ = self.event_tx.send(AlertEvent::StormEnded);
                    }
                }
            }
        }

        self.persist();
        debug!("alert engine shut down");
    }

    fn handle_delta(&mut self, delta: ResourceDelta) {
        for resource in &delta.upserted {
            let effective = effective_rules_for(
                resource,
                &self.rules,
                &self.overrides,
                self.config.default_sustain_seconds,
            );
            for rule in effective {
                let key = (resource.fingerprint.clone(), rule.rule_name.clone());

                if let Some(suppressed_until) = self.suppressions.get(&key) {
                    if resource.last_seen < *suppressed_until {
                        continue;
                    }
                    self.suppressions.remove(&key);
                }

                let value = match metric_value(resource, &rule.metric) {
                    Some(v) => v,
                    None => continue,
                };

                let existing = self.episodes.remove(&key);
                let (updated, transition) = state::evaluate(
                    existing,
                    &resource.fingerprint,
                    &rule.rule_name,
                    &rule.metric,
                    rule.trigger,
                    rule.clear,
                    rule.sustain_seconds,
                    resource.last_seen,
                    value,
                );

                if let Some(episode) = updated.clone() {
                    self.episodes.insert(key, episode);
                }

                match transition {
                    Transition::Triggered => {
                        let episode = updated.expect("triggered episode must exist");
                        let just_entered = self.storm.record_trigger(resource.last_seen);
                        if just_entered {
                            let _ = self.event_tx.send(AlertEvent::StormStarted);
                        }
                        if self.storm.in_storm() {
                            self.storm_buffer.push(episode);
                        } else {
                            let _ = self.event_tx.send(AlertEvent::Triggered(episode));
                        }
                    }
                    Transition::Resolved(episode) => {
                        let _ = self.event_tx.send(AlertEvent::Resolved(episode));
                    }
                    Transition::None => {}
                }
            }
        }

        for removed in &delta.removed {
            let keys: Vec<(Fingerprint, String)> = self
                .episodes
                .keys()
                .filter(|(fp, _)| fp == removed)
                .cloned()
                .collect();
            for key in keys {
                if let Some(episode) = self.episodes.remove(&key) {
                    let _ = self.event_tx.send(AlertEvent::Resolved(episode));
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Acknowledge { id, reply } => {
                let mut found = false;
                for episode in self.episodes.values_mut() {
                    if episode.id == id && episode.phase == Phase::Active {
                        state::acknowledge_episode(episode, chrono::Utc::now());
                        let _ = self.event_tx.send(AlertEvent::Acknowledged(episode.clone()));
                        found = true;
                        break;
                    }
                }
                // Idempotent: acknowledging an already-acknowledged or
                // unknown id still returns success-shaped `true` unless the
                // id has never existed, making acknowledge idempotent.
                let already_acked = self
                    .episodes
                    .values()
                    .any(|e| e.id == id && e.phase == Phase::Acknowledged);
                let _ = reply.send(found || already_acked);
                true
            }
            Command::Suppress {
                fingerprint,
                rule_name,
                until,
            } => {
                self.suppressions.insert((fingerprint, rule_name), until);
                true
            }
            Command::GetActive(reply) => {
                // Pending episodes haven't crossed the sustain window yet
                // and have emitted no `triggered` event; only Active/
                // Acknowledged episodes count as active alerts (§4.4).
                let active = self
                    .episodes
                    .values()
                    .filter(|e| matches!(e.phase, Phase::Active | Phase::Acknowledged))
                    .cloned()
                    .collect();
                let _ = reply.send(active);
                true
            }
            Command::ReloadRules { rules, overrides } => {
                for rule in &rules {
                    if let Err(e) = rule.validate() {
                        warn!(error = %e, "skipping invalid alert rule on reload");
                    }
                }
                self.rules = rules;
                self.overrides = overrides;
                true
            }
            Command::Shutdown => false,
        }
    }

    /// Emit one coalesced `StormSummary` for whatever accumulated in
    /// `storm_buffer` since the last flush, and clear it. A no-op when
    /// nothing triggered in the interval.
    fn flush_storm_buffer(&mut self) {
        if self.storm_buffer.is_empty() {
            return;
        }
        let episodes = std::mem::take(&mut self.storm_buffer);
        let resource_count: std::collections::HashSet<&Fingerprint> =
            episodes.iter().map(|e| &e.fingerprint).collect();
        let resource_count = resource_count.len();
        let _ = self.event_tx.send(AlertEvent::StormSummary {
            episodes,
            resource_count,
        });
    }

    fn persist(&self) {
        let episodes: Vec<Episode> = self.episodes.values().cloned().collect();
        if let Err(e) = persistence::save(&self.config.state_path, &episodes) {
            warn!(error = %e, "failed to persist alert state");
        }
    }
}

fn metric_value(resource: &crate::model::Resource, metric: &str) -> Option<f64> {
    let m = &resource.metrics;
    match metric {
        "cpu_pct" => m.cpu_pct,
        "memory_used_bytes" => m.memory_used_bytes.map(|v| v as f64),
        "disk_used_bytes" => m.disk_used_bytes.map(|v| v as f64),
        "disk_read_bytes_per_sec" => m.disk_read_bytes_per_sec,
        "disk_write_bytes_per_sec" => m.disk_write_bytes_per_sec,
        "net_rx_bytes_per_sec" => m.net_rx_bytes_per_sec,
        "net_tx_bytes_per_sec" => m.net_tx_bytes_per_sec,
        _ => None,
    }
}

#[derive(Clone)]
pub struct AlertHandle {
    command_tx: mpsc::Sender<Command>,
    pub events: broadcast::Sender<AlertEvent>,
}

impl AlertHandle {
    pub fn spawn(
        rules: Vec<AlertRuleConfig>,
        overrides: HashMap<String, AlertOverrideConfig>,
        config: AlertsConfig,
        delta_rx: broadcast::Receiver<ResourceDelta>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(256);
        let storm = StormDetector::new(config.storm_threshold);
        let actor = AlertEngineActor {
            episodes: HashMap::new(),
            suppressions: HashMap::new(),
            rules,
            overrides,
            config,
            delta_rx,
            command_rx,
            event_tx: event_tx.clone(),
            storm,
            storm_buffer: Vec::new(),
        };
        tokio::spawn(actor.run());
        Self {
            command_tx,
            events: event_tx,
        }
    }

    pub async fn acknowledge(&self, id: AlertId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(Command::Acknowledge { id, reply }).await.is_ok() {
            rx.await.unwrap_or(false)
        } else {
            false
        }
    }

    pub async fn suppress(&self, fingerprint: Fingerprint, rule_name: String, until: chrono::DateTime<chrono::Utc>) {
        let _ = self
            .command_tx
            .send(Command::Suppress {
                fingerprint,
                rule_name,
                until,
            })
            .await;
    }

    pub async fn active(&self) -> Vec<Episode> {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(Command::GetActive(reply)).await.is_ok() {
            rx.await.unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub async fn reload_rules(&self, rules: Vec<AlertRuleConfig>, overrides: HashMap<String, AlertOverrideConfig>) {
        let _ = self.command_tx.send(Command::ReloadRules { rules, overrides }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertRuleConfig;
    use crate::identity::Fingerprint;
    use crate::model::{Capacity, Metrics, Resource, ResourceKind, Status};

    fn rule(trigger: f64, clear: f64, sustain_seconds: Option<u64>) -> AlertRuleConfig {
        AlertRuleConfig {
            name: "cpu-high".into(),
            metric: "cpu_pct".into(),
            trigger,
            clear,
            sustain_seconds,
            scope_tag: None,
        }
    }

    fn resource(fingerprint: Fingerprint, cpu_pct: f64) -> Resource {
        Resource {
            fingerprint,
            kind: ResourceKind::Node,
            name: "n".into(),
            parent: None,
            capacity: Capacity::default(),
            metrics: Metrics {
                cpu_pct: Some(cpu_pct),
                ..Metrics::default()
            },
            status: Status::Running,
            tags: Default::default(),
            last_seen: chrono::Utc::now(),
            source_endpoint: "e".into(),
        }
    }

    fn test_config() -> AlertsConfig {
        AlertsConfig {
            storm_threshold: 10,
            default_sustain_seconds: 30,
            removal_grace_seconds: 900,
            staleness_seconds: 90,
            state_path: std::env::temp_dir().join(format!("pulse-alerts-test-{}.json", uuid_like())),
        }
    }

    // Cheap unique-ish suffix without pulling in a uuid dependency just for tests.
    fn uuid_like() -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        std::time::Instant::now().hash(&mut hasher);
        hasher.finish()
    }

    #[tokio::test]
    async fn resolved_event_is_emitted_on_active_to_idle_transition() {
        let (delta_tx, delta_rx) = broadcast::channel(16);
        let handle = AlertHandle::spawn(vec![rule(80.0, 50.0, Some(0))], HashMap::new(), test_config(), delta_rx);
        let mut events = handle.events.subscribe();

        let fp = Fingerprint::for_pve_node("c", "n");
        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fp.clone(), 90.0)],
                removed: vec![],
            })
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::Triggered(_)));
        assert_eq!(handle.active().await.len(), 1);

        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fp, 40.0)],
                removed: vec![],
            })
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::Resolved(_)));
        assert_eq!(handle.active().await.len(), 0, "resolved episode must not linger as active");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn pending_episode_is_not_reported_active() {
        let (delta_tx, delta_rx) = broadcast::channel(16);
        let handle = AlertHandle::spawn(vec![rule(80.0, 50.0, Some(30))], HashMap::new(), test_config(), delta_rx);

        let fp = Fingerprint::for_pve_node("c", "n");
        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fp, 90.0)],
                removed: vec![],
            })
            .unwrap();
        // Give the actor a beat to process the delta before querying.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(handle.active().await.is_empty(), "pending episodes are not active alerts");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn storm_mode_coalesces_triggered_events_instead_of_forwarding_each() {
        let (delta_tx, delta_rx) = broadcast::channel(16);
        let mut config = test_config();
        config.storm_threshold = 2;
        let handle = AlertHandle::spawn(vec![rule(80.0, 50.0, Some(0))], HashMap::new(), config, delta_rx);
        let mut events = handle.events.subscribe();

        let fps: Vec<Fingerprint> = (0..3).map(|i| Fingerprint::for_pve_node("c", &format!("n{i}"))).collect();

        // First trigger: below threshold, forwarded individually.
        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fps[0].clone(), 90.0)],
                removed: vec![],
            })
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::Triggered(_)));

        // Second trigger tips the rolling count to the threshold: storm starts,
        // and this episode is coalesced rather than forwarded as `Triggered`.
        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fps[1].clone(), 90.0)],
                removed: vec![],
            })
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::StormStarted));

        delta_tx
            .send(ResourceDelta {
                upserted: vec![resource(fps[2].clone(), 90.0)],
                removed: vec![],
            })
            .unwrap();

        // Neither the second nor third trigger should arrive as an individual
        // `Triggered` event; instead a single coalesced summary follows.
        loop {
            match events.recv().await.unwrap() {
                AlertEvent::Triggered(_) => panic!("individual Triggered event leaked out of storm mode"),
                AlertEvent::StormSummary { episodes, resource_count } => {
                    assert_eq!(episodes.len(), 2);
                    assert_eq!(resource_count, 2);
                    break;
                }
                _ => continue,
            }
        }

        handle.shutdown().await;
    }
}
