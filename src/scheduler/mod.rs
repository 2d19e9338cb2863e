//! Adaptive Poll Scheduler.
//!
//! `SchedulerHandle` owns one `EndpointPollerHandle` per configured
//! endpoint (see `poller.rs`). A shared `tokio::Semaphore` sized at
//! `min(endpoint_count, max_parallel_polls)` is handed to every poller so
//! the fleet's total in-flight poll count is
//! bounded regardless of how many endpoints are configured; all pollers
//! publish onto one shared broadcast channel for the Resource Cache to
//! subscribe to.

pub mod endpoint;
pub mod messages;
pub mod poller;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};
use tracing::info;

use crate::config::{EndpointConfig, SchedulerConfig};
use endpoint::EndpointState;
use messages::{EndpointHealth, PollEvent};
use poller::EndpointPollerHandle;
use crate::sources::build_client;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct SchedulerHandle {
    pollers: Arc<RwLock<HashMap<String, EndpointPollerHandle>>>,
    semaphore: Arc<Semaphore>,
    config: SchedulerConfig,
    pub events: broadcast::Sender<PollEvent>,
}

impl SchedulerHandle {
    pub fn spawn(endpoints: Vec<EndpointConfig>, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let permits = config.max_parallel_polls.min(endpoints.len().max(1));
        let semaphore = Arc::new(Semaphore::new(permits.max(1)));

        let mut pollers = HashMap::new();
        for endpoint in &endpoints {
            let handle = Self::spawn_one(endpoint, &config, events.clone(), semaphore.clone());
            pollers.insert(endpoint.id.clone(), handle);
        }

        info!(count = pollers.len(), "poll scheduler started");

        Self {
            pollers: Arc::new(RwLock::new(pollers)),
            semaphore,
            config,
            events,
        }
    }

    fn spawn_one(
        endpoint: &EndpointConfig,
        config: &SchedulerConfig,
        events: broadcast::Sender<PollEvent>,
        semaphore: Arc<Semaphore>,
    ) -> EndpointPollerHandle {
        let base = Duration::from_secs(
            endpoint
                .poll_interval_seconds
                .unwrap_or(config.base_poll_interval_seconds),
        );
        let max = Duration::from_secs(config.max_poll_interval_seconds).max(base);
        let state = EndpointState::new(endpoint.id.clone(), base, max, config.error_threshold);
        let client = build_client(endpoint, Duration::from_secs(config.poll_timeout_seconds));
        EndpointPollerHandle::spawn(
            state,
            client,
            events,
            semaphore,
            Duration::from_secs(config.poll_timeout_seconds),
        )
    }

    pub async fn poll_now(&self, endpoint_id: &str) {
        let handle = self.pollers.read().unwrap().get(endpoint_id).cloned();
        if let Some(handle) = handle {
            handle.poll_now().await;
        }
    }

    pub async fn health(&self) -> Vec<EndpointHealth> {
        let handles: Vec<_> = self.pollers.read().unwrap().values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(health) = handle.health().await {
                out.push(health);
            }
        }
        out
    }

    /// Apply a hot-reloaded endpoint set: endpoints no longer present are
    /// shut down, new ones are spawned at the base interval, endpoints
    /// present in both are left running untouched (their backoff and
    /// error streak survive the reload).
    pub async fn reload(&self, endpoints: Vec<EndpointConfig>) {
        let incoming_ids: std::collections::HashSet<&str> =
            endpoints.iter().map(|e| e.id.as_str()).collect();

        let removed: Vec<EndpointPollerHandle> = {
            let mut pollers = self.pollers.write().unwrap();
            let removed_ids: Vec<String> = pollers
                .keys()
                .filter(|id| !incoming_ids.contains(id.as_str()))
                .cloned()
                .collect();
            removed_ids
                .into_iter()
                .filter_map(|id| pollers.remove(&id))
                .collect()
        };
        for handle in removed {
            handle.shutdown().await;
        }

        let to_add: Vec<EndpointConfig> = {
            let pollers = self.pollers.read().unwrap();
            endpoints
                .into_iter()
                .filter(|e| !pollers.contains_key(&e.id))
                .collect()
        };
        for endpoint in &to_add {
            let handle = Self::spawn_one(endpoint, &self.config, self.events.clone(), self.semaphore.clone());
            self.pollers.write().unwrap().insert(endpoint.id.clone(), handle);
        }
    }

    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.pollers.write().unwrap().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_with_no_endpoints_is_a_noop_ready_scheduler() {
        let handle = SchedulerHandle::spawn(Vec::new(), SchedulerConfig::default());
        assert!(handle.health().await.is_empty());
        handle.shutdown().await;
    }
}
