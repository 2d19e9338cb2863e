//! `Core`: the single explicitly-owned value that wires the four
//! subsystems together instead of relying on global mutable state. Built
//! once at startup via `Core::new`, started with `Core::start`, torn down
//! with `Core::shutdown` — a New → Start → Shutdown lifecycle collected
//! behind one type so the binary and tests don't have to re-derive the
//! wiring order.

use std::sync::Arc;

use tracing::info;

use crate::alerts::AlertHandle;
use crate::config::ResolvedConfig;
use crate::events::EventBusHandle;
use crate::metrics::backend::MetricsBackend;
use crate::metrics::sqlite::SqliteMetricsBackend;
use crate::metrics::MetricsStoreHandle;
use crate::normalize::ResourceCacheHandle;
use crate::scheduler::SchedulerHandle;

/// The running system: one handle per subsystem actor, plus the resolved
/// configuration they were built from (kept so `reload` can diff against
/// it). Cloning a `Core` is cheap — every field is itself a cheap-to-clone
/// handle onto its actor, matching the handle pattern the rest of the
/// crate uses throughout.
#[derive(Clone)]
pub struct Core {
    pub scheduler: SchedulerHandle,
    pub cache: ResourceCacheHandle,
    pub metrics: MetricsStoreHandle,
    pub alerts: AlertHandle,
    pub events: EventBusHandle,
    config: ResolvedConfig,
}

impl Core {
    /// Build and start every subsystem, wired leaves-first: scheduler
    /// publishes poll events, the resource cache consumes them and
    /// publishes deltas, the metrics store and alert engine each consume
    /// deltas independently, and the event bus fans both the deltas and
    /// the alert engine's events out to API/WS subscribers.
    pub async fn new(config: ResolvedConfig) -> anyhow::Result<Self> {
        let scheduler = SchedulerHandle::spawn(config.endpoints.clone(), config.scheduler.clone());

        let cache = ResourceCacheHandle::spawn(
            scheduler.events.subscribe(),
            config.alerts.staleness_seconds,
            config.alerts.removal_grace_seconds,
        );

        let backend = Self::build_metrics_backend(&config).await?;
        let metrics = MetricsStoreHandle::spawn(backend, config.metrics.clone(), cache.deltas.subscribe());

        let alerts = AlertHandle::spawn(
            config.alert_rules.clone(),
            config.overrides.clone(),
            config.alerts.clone(),
            cache.deltas.subscribe(),
        );

        let events = EventBusHandle::spawn(cache.deltas.subscribe(), alerts.events.subscribe());

        info!(
            endpoints = config.endpoints.len(),
            rules = config.alert_rules.len(),
            "pulse core started"
        );

        Ok(Self {
            scheduler,
            cache,
            metrics,
            alerts,
            events,
            config,
        })
    }

    async fn build_metrics_backend(config: &ResolvedConfig) -> anyhow::Result<Arc<dyn MetricsBackend>> {
        let path = config.metrics.sqlite_path.to_string_lossy().to_string();
        let backend = SqliteMetricsBackend::new(&path).await?;
        Ok(Arc::new(backend))
    }

    /// Apply a hot-reloaded endpoint/rule diff. Endpoint changes go straight to the
    /// scheduler; rule changes go to the alert engine. The resource cache,
    /// metrics store and event bus need no reload step — they react to
    /// whatever the upstream actors publish next.
    pub async fn reload(&self, config: ResolvedConfig) {
        self.scheduler.reload(config.endpoints.clone()).await;
        self.alerts.reload_rules(config.alert_rules.clone(), config.overrides.clone()).await;
        self.events.publish_configuration_reloaded();
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Ordered shutdown: refuse new polls and drain
    /// in-flight ones (scheduler), stop accepting resource deltas
    /// (cache), flush the metrics buffer and persist alert state (metrics
    /// store, alert engine each do this on their own `Shutdown` command),
    /// then stop publishing events.
    pub async fn shutdown(&self) {
        info!("pulse core shutting down");
        self.scheduler.shutdown().await;
        self.cache.shutdown().await;
        self.metrics.shutdown().await;
        self.alerts.shutdown().await;
        self.events.shutdown().await;
        info!("pulse core shut down");
    }
}
