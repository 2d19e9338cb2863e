//! Configuration model.
//!
//! A two-phase shape: a `Config` deserialized directly
//! from the on-disk JSON file with `#[serde(default = ...)]` everywhere a
//! tunable has a default, and `Config::resolve()` producing a
//! `ResolvedConfig` with alert-rule overrides merged and validated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Which source family an endpoint belongs to and the family-specific
/// connection fields it needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Pve {
        url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
        cluster_name: Option<String>,
    },
    Pbs {
        url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
        instance_name: Option<String>,
    },
    Pmg {
        url: String,
        token_id: Option<String>,
        token_secret: Option<String>,
    },
    Docker {
        url: String,
        host_id: Option<String>,
    },
    K8s {
        kubeconfig: Option<String>,
        context: Option<String>,
        cluster_name: Option<String>,
    },
    HostAgent {
        url: String,
        token: Option<String>,
    },
}

/// One polled endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub id: String,
    pub display: Option<String>,
    #[serde(flatten)]
    pub source: SourceKind,
    /// Per-endpoint poll interval override, in seconds.
    pub poll_interval_seconds: Option<u64>,
}

/// Poll Scheduler tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_base_poll_interval")]
    pub base_poll_interval_seconds: u64,
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_seconds: u64,
    #[serde(default = "default_max_parallel_polls")]
    pub max_parallel_polls: usize,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_poll_interval_seconds: default_base_poll_interval(),
            max_poll_interval_seconds: default_max_poll_interval(),
            max_parallel_polls: default_max_parallel_polls(),
            poll_timeout_seconds: default_poll_timeout(),
            error_threshold: default_error_threshold(),
        }
    }
}

fn default_base_poll_interval() -> u64 {
    10
}
fn default_max_poll_interval() -> u64 {
    300
}
fn default_max_parallel_polls() -> usize {
    32
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_error_threshold() -> u32 {
    5
}

/// Metrics Store tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_raw_retention_hours")]
    pub raw_retention_hours: u64,
    #[serde(default = "default_minute_retention_days")]
    pub minute_retention_days: u64,
    #[serde(default = "default_hour_retention_days")]
    pub hour_retention_days: u64,
    #[serde(default = "default_day_retention_days")]
    pub day_retention_days: u64,
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
    #[serde(default = "default_max_series")]
    pub max_series: usize,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: std::path::PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            raw_retention_hours: default_raw_retention_hours(),
            minute_retention_days: default_minute_retention_days(),
            hour_retention_days: default_hour_retention_days(),
            day_retention_days: default_day_retention_days(),
            flush_interval_seconds: default_flush_interval_seconds(),
            max_series: default_max_series(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_raw_retention_hours() -> u64 {
    24
}
fn default_minute_retention_days() -> u64 {
    7
}
fn default_hour_retention_days() -> u64 {
    60
}
fn default_day_retention_days() -> u64 {
    365
}
fn default_flush_interval_seconds() -> u64 {
    30
}
fn default_max_series() -> usize {
    50_000
}
fn default_sqlite_path() -> std::path::PathBuf {
    std::path::PathBuf::from("./pulse-metrics.db")
}

/// Alert Engine tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_storm_threshold")]
    pub storm_threshold: u32,
    #[serde(default = "default_sustain_seconds")]
    pub default_sustain_seconds: u64,
    #[serde(default = "default_removal_grace_seconds")]
    pub removal_grace_seconds: u64,
    #[serde(default = "default_staleness_seconds")]
    pub staleness_seconds: u64,
    #[serde(default = "default_state_path")]
    pub state_path: std::path::PathBuf,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            storm_threshold: default_storm_threshold(),
            default_sustain_seconds: default_sustain_seconds(),
            removal_grace_seconds: default_removal_grace_seconds(),
            staleness_seconds: default_staleness_seconds(),
            state_path: default_state_path(),
        }
    }
}

fn default_storm_threshold() -> u32 {
    10
}
fn default_sustain_seconds() -> u64 {
    30
}
fn default_removal_grace_seconds() -> u64 {
    900
}
fn default_staleness_seconds() -> u64 {
    90
}
fn default_state_path() -> std::path::PathBuf {
    std::path::PathBuf::from("./pulse-alerts.json")
}

/// One alert rule definition, named and referenced by metric + scope.
///
/// Also `Serialize` (unlike most of this file) since it round-trips through
/// `GET`/`PUT /api/alerts/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    pub name: String,
    pub metric: String,
    pub trigger: f64,
    pub clear: f64,
    pub sustain_seconds: Option<u64>,
    /// `None` applies globally; `Some(tag)` scopes the rule to resources
    /// carrying that tag; a fingerprint-keyed override lives in `overrides`.
    pub scope_tag: Option<String>,
}

impl AlertRuleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.clear >= self.trigger {
            return Err(format!(
                "rule '{}': clear threshold ({}) must be below trigger threshold ({})",
                self.name, self.clear, self.trigger
            ));
        }
        Ok(())
    }
}

/// Per-fingerprint rule override, keyed by fingerprint string in
/// `Config::overrides`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOverrideConfig {
    pub rule: String,
    pub trigger: Option<f64>,
    pub clear: Option<f64>,
    pub sustain_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    pub auth_token: Option<String>,
    #[serde(default = "default_api_cors")]
    pub enable_cors: bool,
}

fn default_api_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_api_cors() -> bool {
    true
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub alert_rules: Vec<AlertRuleConfig>,
    #[serde(default)]
    pub overrides: HashMap<String, AlertOverrideConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub api: Option<ApiConfig>,
}

/// Fully resolved, validated configuration ready to hand to `Core::new`.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub alert_rules: Vec<AlertRuleConfig>,
    pub overrides: HashMap<String, AlertOverrideConfig>,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
    pub alerts: AlertsConfig,
    pub api: Option<ApiConfig>,
}

impl Config {
    /// Validate and resolve the raw config into a `ResolvedConfig`.
    ///
    /// Rather than a per-override-field merge at resolve time, alert rule
    /// overrides here are resolved lazily per-episode by the Alert Engine
    /// (see `crate::alerts::rules`) because an override's target fingerprint
    /// is not known until a resource with a matching tag actually appears.
    /// This function only validates static shape.
    pub fn resolve(self) -> anyhow::Result<ResolvedConfig> {
        if self.scheduler.max_parallel_polls == 0 {
            anyhow::bail!("scheduler.max_parallel_polls must be at least 1");
        }
        if self.scheduler.max_poll_interval_seconds < self.scheduler.base_poll_interval_seconds {
            anyhow::bail!(
                "scheduler.max_poll_interval_seconds must be >= base_poll_interval_seconds"
            );
        }
        for rule in &self.alert_rules {
            rule.validate().map_err(|e| anyhow::anyhow!(e))?;
        }
        for (fingerprint, over) in &self.overrides {
            if !self.alert_rules.iter().any(|r| r.name == over.rule) {
                anyhow::bail!(
                    "override for '{}' references unknown rule '{}'",
                    fingerprint,
                    over.rule
                );
            }
        }
        if self.metrics.raw_retention_hours == 0
            || self.metrics.minute_retention_days == 0
            || self.metrics.hour_retention_days == 0
            || self.metrics.day_retention_days == 0
        {
            anyhow::bail!("metrics retention windows must all be non-zero");
        }

        Ok(ResolvedConfig {
            endpoints: self.endpoints,
            alert_rules: self.alert_rules,
            overrides: self.overrides,
            scheduler: self.scheduler,
            metrics: self.metrics,
            alerts: self.alerts,
            api: self.api,
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{path}': {e}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file '{path}': {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_hysteresis() {
        let rule = AlertRuleConfig {
            name: "cpu-high".into(),
            metric: "cpu_pct".into(),
            trigger: 50.0,
            clear: 80.0,
            sustain_seconds: None,
            scope_tag: None,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn accepts_valid_hysteresis() {
        let rule = AlertRuleConfig {
            name: "cpu-high".into(),
            metric: "cpu_pct".into(),
            trigger: 80.0,
            clear: 50.0,
            sustain_seconds: None,
            scope_tag: None,
        };
        assert!(rule.validate().is_ok());
    }
}
