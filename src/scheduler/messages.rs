//! Messages exchanged with the Poll Scheduler.

use tokio::sync::oneshot;

use crate::model::Resource;

/// Commands one `EndpointPoller` accepts over its mpsc command channel.
#[derive(Debug)]
pub enum PollerCommand {
    /// Force an immediate poll, preempting the scheduled next-fire time.
    PollNow,
    GetHealth(oneshot::Sender<EndpointHealth>),
    Shutdown,
}

/// One successful poll's output, published on the scheduler's broadcast
/// channel for the Resource Cache (and anything else) to subscribe to.
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub endpoint_id: String,
    pub resources: Vec<Resource>,
    pub polled_at: chrono::DateTime<chrono::Utc>,
}

/// Health snapshot for one endpoint, the concrete shape behind the
/// "endpoint health surface".
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub endpoint_id: String,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_success: Option<chrono::DateTime<chrono::Utc>>,
    pub degraded: bool,
    pub current_interval_seconds: u64,
    pub dropped_ticks: u64,
}
