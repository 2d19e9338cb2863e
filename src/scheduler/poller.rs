//! `EndpointPoller`: one actor per configured endpoint, polling any
//! `SourceClient`. Each poller sleeps until its own adaptively
//! computed next-fire time, then acquires a shared semaphore permit
//! before polling — this is what bounds total in-flight polls at
//! `max_parallel_polls` across the whole endpoint fleet.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, instrument, warn};

use super::endpoint::EndpointState;
use super::messages::{EndpointHealth, PollEvent, PollerCommand};
use crate::sources::SourceClient;

pub struct EndpointPoller {
    state: EndpointState,
    client: Box<dyn SourceClient>,
    command_rx: mpsc::Receiver<PollerCommand>,
    event_tx: tokio::sync::broadcast::Sender<PollEvent>,
    semaphore: Arc<Semaphore>,
    poll_timeout: Duration,
}

impl EndpointPoller {
    pub fn new(
        state: EndpointState,
        client: Box<dyn SourceClient>,
        command_rx: mpsc::Receiver<PollerCommand>,
        event_tx: tokio::sync::broadcast::Sender<PollEvent>,
        semaphore: Arc<Semaphore>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            state,
            client,
            command_rx,
            event_tx,
            semaphore,
            poll_timeout,
        }
    }

    #[instrument(skip(self), fields(endpoint = %self.state.endpoint_id))]
    pub async fn run(mut self) {
        if let Err(e) = self.client.connect().await {
            warn!(error = %e, "endpoint connect failed, will retry on first poll");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(self.state.next_fire) => {
                    self.poll_once().await;
                }
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow => self.state.fire_now(),
                        PollerCommand::GetHealth(reply) => {
                            let _ = reply.send(self.state.health());
                        }
                        PollerCommand::Shutdown => break,
                    }
                }
            }
        }

        self.client.close().await;
        debug!("endpoint poller shut down");
    }

    async fn poll_once(&mut self) {
        let _permit = self.semaphore.acquire().await;
        let polled_at = chrono::Utc::now();
        match tokio::time::timeout(self.poll_timeout, self.client.poll()).await {
            Ok(Ok(resources)) => {
                self.state.record_success(polled_at);
                let event = PollEvent {
                    endpoint_id: self.state.endpoint_id.clone(),
                    resources,
                    polled_at,
                };
                if self.event_tx.send(event).is_err() {
                    debug!("no subscribers for poll events");
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "poll failed");
                self.state.record_failure(e.to_string());
            }
            Err(_) => {
                warn!("poll timed out");
                self.state.record_failure("poll timed out".to_string());
                self.state.dropped_ticks += 1;
            }
        }
    }
}

/// Cloneable handle to a running `EndpointPoller`.
#[derive(Clone)]
pub struct EndpointPollerHandle {
    pub endpoint_id: String,
    command_tx: mpsc::Sender<PollerCommand>,
}

impl EndpointPollerHandle {
    pub fn spawn(
        state: EndpointState,
        client: Box<dyn SourceClient>,
        event_tx: tokio::sync::broadcast::Sender<PollEvent>,
        semaphore: Arc<Semaphore>,
        poll_timeout: Duration,
    ) -> Self {
        let endpoint_id = state.endpoint_id.clone();
        let (command_tx, command_rx) = mpsc::channel(8);
        let poller = EndpointPoller::new(state, client, command_rx, event_tx, semaphore, poll_timeout);
        tokio::spawn(poller.run());
        Self {
            endpoint_id,
            command_tx,
        }
    }

    pub async fn poll_now(&self) {
        let _ = self.command_tx.send(PollerCommand::PollNow).await;
    }

    pub async fn health(&self) -> Option<EndpointHealth> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(PollerCommand::GetHealth(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(PollerCommand::Shutdown).await;
    }
}
