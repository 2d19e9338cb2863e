//! Alert episode state machine: idle → pending → active →
//! acknowledged, with hysteresis and the sustained-threshold "pending"
//! stage. Generalizes a fixed grace-sample-count evaluation
//! (Ok/Exceeding/StartsToExceed/BackToOk) into a time-based sustain
//! window, and adds an acknowledge/storm lifecycle on top.

use serde::{Deserialize, Serialize};

use crate::identity::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Active,
    Acknowledged,
}

/// A stable alert identity. `id` is derived once from `(fingerprint, metric,
/// since)` and never changes for the life of the episode, even if the
/// backing rule's threshold is edited mid-episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    fn new(fingerprint: &Fingerprint, metric: &str, since: chrono::DateTime<chrono::Utc>) -> Self {
        AlertId(format!("{}:{}:{}", fingerprint.as_str(), metric, since.timestamp_millis()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: AlertId,
    pub fingerprint: Fingerprint,
    pub rule_name: String,
    pub metric: String,
    pub phase: Phase,
    pub threshold: f64,
    pub since: chrono::DateTime<chrono::Utc>,
    pub first_exceed_at: chrono::DateTime<chrono::Utc>,
    pub last_value: f64,
    pub acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub enum Transition {
    /// No externally visible change.
    None,
    /// Episode entered `Active` for the first time; emit a triggered event.
    Triggered,
    /// Episode's value dropped below `clear`; emit a resolved event carrying
    /// the episode as it stood at the clearing sample, then drop it.
    Resolved(Episode),
}

impl Episode {
    fn new_pending(fingerprint: Fingerprint, rule_name: String, metric: String, threshold: f64, at: chrono::DateTime<chrono::Utc>, value: f64) -> Self {
        Episode {
            id: AlertId::new(&fingerprint, &metric, at),
            fingerprint,
            rule_name,
            metric,
            phase: Phase::Pending,
            threshold,
            since: at,
            first_exceed_at: at,
            last_value: value,
            acknowledged_at: None,
        }
    }

    /// Apply a new sample to an existing pending/active episode.
    ///
    /// Sustain is strict continuous exceedance: any single sample under
    /// `trigger` while `Pending` cancels the episode outright rather than
    /// tolerating a dip.
    fn apply_sample(&mut self, trigger: f64, clear: f64, sustain_seconds: u64, at: chrono::DateTime<chrono::Utc>, value: f64) -> (Transition, bool /* drop */) {
        self.last_value = value;
        self.threshold = trigger;
        match self.phase {
            Phase::Pending => {
                if value < trigger {
                    return (Transition::None, true);
                }
                let elapsed = (at - self.first_exceed_at).num_seconds().max(0) as u64;
                if elapsed >= sustain_seconds {
                    self.phase = Phase::Active;
                    self.since = self.first_exceed_at;
                    (Transition::Triggered, false)
                } else {
                    (Transition::None, false)
                }
            }
            Phase::Active | Phase::Acknowledged => {
                if value < clear {
                    (Transition::Resolved(self.clone()), true)
                } else {
                    (Transition::None, false)
                }
            }
        }
    }

    fn acknowledge(&mut self, at: chrono::DateTime<chrono::Utc>) {
        if self.phase == Phase::Active {
            self.phase = Phase::Acknowledged;
            self.acknowledged_at = Some(at);
        }
    }
}

/// Evaluate one sample against the current episode (if any) for a
/// `(fingerprint, rule)` pair, returning the updated episode (or `None` if
/// it resolved/never started) and the transition that occurred.
pub fn evaluate(
    existing: Option<Episode>,
    fingerprint: &Fingerprint,
    rule_name: &str,
    metric: &str,
    trigger: f64,
    clear: f64,
    sustain_seconds: u64,
    at: chrono::DateTime<chrono::Utc>,
    value: f64,
) -> (Option<Episode>, Transition) {
    match existing {
        Some(mut episode) => {
            let (transition, drop) = episode.apply_sample(trigger, clear, sustain_seconds, at, value);
            if drop {
                (None, transition)
            } else {
                (Some(episode), transition)
            }
        }
        None => {
            if value >= trigger {
                let episode = Episode::new_pending(
                    fingerprint.clone(),
                    rule_name.to_string(),
                    metric.to_string(),
                    trigger,
                    at,
                    value,
                );
                if sustain_seconds == 0 {
                    let mut episode = episode;
                    episode.phase = Phase::Active;
                    (Some(episode), Transition::Triggered)
                } else {
                    (Some(episode), Transition::None)
                }
            } else {
                (None, Transition::None)
            }
        }
    }
}

pub fn acknowledge_episode(episode: &mut Episode, at: chrono::DateTime<chrono::Utc>) {
    episode.acknowledge(at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;

    fn fp() -> Fingerprint {
        Fingerprint::for_pve_node("c", "n")
    }

    #[test]
    fn zero_sustain_triggers_immediately() {
        let (episode, transition) = evaluate(None, &fp(), "r", "cpu_pct", 80.0, 50.0, 0, chrono::Utc::now(), 90.0);
        assert!(matches!(transition, Transition::Triggered));
        assert_eq!(episode.unwrap().phase, Phase::Active);
    }

    #[test]
    fn sustain_window_holds_pending_until_elapsed() {
        let t0 = chrono::Utc::now();
        let (episode, transition) = evaluate(None, &fp(), "r", "cpu_pct", 80.0, 50.0, 30, t0, 90.0);
        assert!(matches!(transition, Transition::None));
        let episode = episode.unwrap();
        assert_eq!(episode.phase, Phase::Pending);

        let (episode, transition) = evaluate(
            Some(episode),
            &fp(),
            "r",
            "cpu_pct",
            80.0,
            50.0,
            30,
            t0 + chrono::Duration::seconds(31),
            91.0,
        );
        assert!(matches!(transition, Transition::Triggered));
        assert_eq!(episode.unwrap().phase, Phase::Active);
    }

    #[test]
    fn single_dip_cancels_pending_episode() {
        let t0 = chrono::Utc::now();
        let (episode, _) = evaluate(None, &fp(), "r", "cpu_pct", 80.0, 50.0, 30, t0, 90.0);
        let (episode, transition) = evaluate(
            episode,
            &fp(),
            "r",
            "cpu_pct",
            80.0,
            50.0,
            30,
            t0 + chrono::Duration::seconds(5),
            70.0,
        );
        assert!(matches!(transition, Transition::None));
        assert!(episode.is_none());
    }

    #[test]
    fn active_episode_resolves_below_clear() {
        let t0 = chrono::Utc::now();
        let (episode, _) = evaluate(None, &fp(), "r", "cpu_pct", 80.0, 50.0, 0, t0, 90.0);
        let (episode, transition) = evaluate(
            episode,
            &fp(),
            "r",
            "cpu_pct",
            80.0,
            50.0,
            0,
            t0 + chrono::Duration::seconds(5),
            40.0,
        );
        assert!(matches!(transition, Transition::Resolved(_)));
        if let Transition::Resolved(resolved) = transition {
            assert_eq!(resolved.last_value, 40.0);
        }
        assert!(episode.is_none());
    }

    #[test]
    fn id_is_stable_across_threshold_edits_mid_episode() {
        let t0 = chrono::Utc::now();
        let (episode, _) = evaluate(None, &fp(), "r", "cpu_pct", 80.0, 50.0, 0, t0, 90.0);
        let id_before = episode.as_ref().unwrap().id.clone();
        // Simulate a rule edit: trigger moves from 80 to 85 mid-episode.
        let (episode, _) = evaluate(
            episode,
            &fp(),
            "r",
            "cpu_pct",
            85.0,
            50.0,
            0,
            t0 + chrono::Duration::seconds(5),
            88.0,
        );
        assert_eq!(episode.unwrap().id, id_before);
    }
}
