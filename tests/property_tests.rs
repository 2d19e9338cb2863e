//! Quantified invariants: P1 (idempotent rollup), P5
//! (hysteresis), and P6 (sustained I/O) expressed as property tests over
//! generated inputs, complementing the example-based scenarios in
//! `alert_scenarios.rs`.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use pulse_core::alerts::state::{evaluate, Transition};
use pulse_core::identity::Fingerprint;
use pulse_core::metrics::schema::{MetricPoint, Tier};
use pulse_core::metrics::tiers::roll_up;

fn fp() -> Fingerprint {
    Fingerprint::for_pve_node("prod", "pve1")
}

proptest! {
    /// P1 — running rollup twice over the same input points always
    /// produces byte-identical output, regardless of how many points or
    /// what values they carry.
    #[test]
    fn rollup_is_always_idempotent(
        values in prop::collection::vec(0.0_f64..1000.0, 1..200),
    ) {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let points: Vec<MetricPoint> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| MetricPoint::raw("fp".into(), "cpu_pct".into(), base + Duration::seconds(i as i64 * 7), v))
            .collect();

        let once = roll_up(&points, Tier::Minute);
        let twice = roll_up(&roll_up(&points, Tier::Minute), Tier::Minute);
        prop_assert_eq!(once, twice);
    }

    /// P5 — a series that only ever takes values strictly between `clear`
    /// and `trigger` never produces an event, no matter how it oscillates
    /// or for how long.
    #[test]
    fn hysteresis_band_never_fires(
        values in prop::collection::vec(70.5_f64..79.5, 1..300),
    ) {
        let t0 = Utc::now();
        let mut episode = None;
        let mut fired = false;
        for (i, value) in values.into_iter().enumerate() {
            let at = t0 + Duration::seconds(i as i64 * 10);
            let (next, transition) = evaluate(episode.take(), &fp(), "cpu-high", "cpu_pct", 80.0, 70.0, 0, at, value);
            if !matches!(transition, Transition::None) {
                fired = true;
            }
            episode = next;
        }
        prop_assert!(!fired);
    }

    /// P6 — for a sustain window `S`, any single contiguous spike shorter
    /// than `S` produces no `triggered` event, regardless of how high the
    /// spike value is.
    #[test]
    fn short_spike_below_sustain_window_never_triggers(
        spike_duration_secs in 1i64..29,
        spike_value in 10.1_f64..100.0,
    ) {
        let t0 = Utc::now();
        const SUSTAIN: u64 = 30;

        // Single spike: first_exceed at t=0, a second sample still above
        // trigger at t=spike_duration_secs (< SUSTAIN), then back to 0.
        let (episode, transition) = evaluate(None, &fp(), "netin-high", "net_rx_bytes_per_sec", 10.0, 5.0, SUSTAIN, t0, spike_value);
        prop_assert!(matches!(transition, Transition::None));

        let (episode, transition) = evaluate(
            episode,
            &fp(),
            "netin-high",
            "net_rx_bytes_per_sec",
            10.0,
            5.0,
            SUSTAIN,
            t0 + Duration::seconds(spike_duration_secs),
            spike_value,
        );
        prop_assert!(matches!(transition, Transition::None));

        let (episode, transition) = evaluate(
            episode,
            &fp(),
            "netin-high",
            "net_rx_bytes_per_sec",
            10.0,
            5.0,
            SUSTAIN,
            t0 + Duration::seconds(spike_duration_secs + 1),
            0.0,
        );
        prop_assert!(matches!(transition, Transition::None));
        prop_assert!(episode.is_none(), "dip below trigger while pending must cancel the episode");
    }
}
