//! Storm detection: coalesces alert-triggered events into a single
//! "storm" signal when many episodes activate within a short window,
//! instead of flooding subscribers with individual events.

use std::collections::VecDeque;

pub struct StormDetector {
    threshold: u32,
    window: chrono::Duration,
    timestamps: VecDeque<chrono::DateTime<chrono::Utc>>,
    in_storm: bool,
}

impl StormDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            window: chrono::Duration::seconds(1),
            timestamps: VecDeque::new(),
            in_storm: false,
        }
    }

    /// Record one new trigger and return whether storm mode just started
    /// (the caller should coalesce subsequent triggered events into a
    /// single "storm" notification while `in_storm()` stays true).
    pub fn record_trigger(&mut self, at: chrono::DateTime<chrono::Utc>) -> bool {
        self.timestamps.push_back(at);
        self.evict_outside_window(at);

        if !self.in_storm && self.timestamps.len() as u32 >= self.threshold {
            self.in_storm = true;
            return true;
        }
        false
    }

    /// Storm mode exits once the rolling count drops to half the
    /// threshold.
    pub fn tick(&mut self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.evict_outside_window(now);
        if self.in_storm && (self.timestamps.len() as u32) <= self.threshold / 2 {
            self.in_storm = false;
            return true;
        }
        false
    }

    pub fn in_storm(&self) -> bool {
        self.in_storm
    }

    fn evict_outside_window(&mut self, now: chrono::DateTime<chrono::Utc>) {
        while let Some(&front) = self.timestamps.front() {
            if now - front > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}
