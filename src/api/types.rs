//! Shared API request/response types for the `/api/*` and `/ws` surface
//! for the metrics-history and alerts API routes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alerts::state::Episode;
use crate::config::{AlertOverrideConfig, AlertRuleConfig};
use crate::metrics::schema::MetricPoint;

/// Query params for `GET /api/metrics/history/{kind}/{id}`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub metric: String,
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_points")]
    pub points: usize,
}

fn default_points() -> usize {
    120
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub fingerprint: String,
    pub metric: String,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub active: Vec<Episode>,
}

#[derive(Debug, Serialize)]
pub struct AcknowledgeResponse {
    pub acknowledged: bool,
}

/// Body of `POST /api/alerts/suppress`: `{ruleId, scope, untilSeconds}`
/// where `scope` is the fingerprint the suppression applies to.
#[derive(Debug, Deserialize)]
pub struct SuppressRequest {
    pub rule_id: String,
    pub scope: String,
    pub until_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AlertConfigResponse {
    pub rules: Vec<AlertRuleConfig>,
    pub overrides: HashMap<String, AlertOverrideConfig>,
}
