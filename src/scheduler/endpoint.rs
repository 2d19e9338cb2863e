//! Per-endpoint adaptive scheduling state.

use std::time::Duration;
use tokio::time::Instant;

use crate::scheduler::messages::EndpointHealth;

/// Tracks one endpoint's next-fire time, backoff state and health
/// counters. Each endpoint advances independently — there is no global
/// tick shared across endpoints — each endpoint gets its own next-fire time.
pub struct EndpointState {
    pub endpoint_id: String,
    base_interval: Duration,
    max_interval: Duration,
    error_threshold: u32,
    current_interval: Duration,
    pub next_fire: Instant,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_success: Option<chrono::DateTime<chrono::Utc>>,
    pub dropped_ticks: u64,
    pub in_flight: bool,
}

impl EndpointState {
    pub fn new(endpoint_id: String, base_interval: Duration, max_interval: Duration, error_threshold: u32) -> Self {
        Self {
            endpoint_id,
            base_interval,
            max_interval,
            error_threshold,
            current_interval: base_interval,
            next_fire: Instant::now(),
            consecutive_errors: 0,
            last_error: None,
            last_success: None,
            dropped_ticks: 0,
            in_flight: false,
        }
    }

    pub fn degraded(&self) -> bool {
        self.consecutive_errors >= self.error_threshold
    }

    /// Record a successful poll: reset backoff to the base interval and
    /// clear the error streak.
    pub fn record_success(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.consecutive_errors = 0;
        self.last_error = None;
        self.last_success = Some(at);
        self.current_interval = self.base_interval;
        self.next_fire = Instant::now() + self.current_interval;
    }

    /// Record a failed poll (error or timeout): double the interval, capped
    /// at `max_interval`, and bump the error streak.
    pub fn record_failure(&mut self, error: String) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(error);
        self.current_interval = std::cmp::min(self.current_interval * 2, self.max_interval);
        self.next_fire = Instant::now() + self.current_interval;
    }

    /// Preempt the schedule for an immediate poll (`PollNow`).
    pub fn fire_now(&mut self) {
        self.next_fire = Instant::now();
    }

    pub fn is_due(&self) -> bool {
        !self.in_flight && Instant::now() >= self.next_fire
    }

    pub fn health(&self) -> EndpointHealth {
        EndpointHealth {
            endpoint_id: self.endpoint_id.clone(),
            consecutive_errors: self.consecutive_errors,
            last_error: self.last_error.clone(),
            last_success: self.last_success,
            degraded: self.degraded(),
            current_interval_seconds: self.current_interval.as_secs(),
            dropped_ticks: self.dropped_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut state = EndpointState::new(
            "e1".into(),
            Duration::from_secs(10),
            Duration::from_secs(40),
            5,
        );
        state.record_failure("boom".into());
        assert_eq!(state.current_interval, Duration::from_secs(20));
        state.record_failure("boom".into());
        assert_eq!(state.current_interval, Duration::from_secs(40));
        state.record_failure("boom".into());
        assert_eq!(state.current_interval, Duration::from_secs(40));
    }

    #[test]
    fn success_resets_backoff_and_errors() {
        let mut state = EndpointState::new(
            "e1".into(),
            Duration::from_secs(10),
            Duration::from_secs(300),
            5,
        );
        state.record_failure("boom".into());
        state.record_failure("boom".into());
        state.record_success(chrono::Utc::now());
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.current_interval, Duration::from_secs(10));
    }

    #[test]
    fn degraded_after_error_threshold() {
        let mut state = EndpointState::new(
            "e1".into(),
            Duration::from_secs(10),
            Duration::from_secs(300),
            2,
        );
        assert!(!state.degraded());
        state.record_failure("1".into());
        assert!(!state.degraded());
        state.record_failure("2".into());
        assert!(state.degraded());
    }
}
