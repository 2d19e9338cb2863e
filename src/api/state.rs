//! API shared state: one field per subsystem handle, so every route
//! handler gets cheap clones of what it needs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::alerts::AlertHandle;
use crate::config::{AlertOverrideConfig, AlertRuleConfig};
use crate::events::EventBusHandle;
use crate::metrics::MetricsStoreHandle;
use crate::normalize::ResourceCacheHandle;
use crate::scheduler::SchedulerHandle;

/// The live alert rule set, shared so `GET`/`PUT /api/alerts/config` can
/// read and replace it without a round trip through the Alert Engine.
#[derive(Debug, Clone, Default)]
pub struct AlertRuleSet {
    pub rules: Vec<AlertRuleConfig>,
    pub overrides: HashMap<String, AlertOverrideConfig>,
}

/// Shared state passed to all API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
    pub cache: ResourceCacheHandle,
    pub metrics: MetricsStoreHandle,
    pub alerts: AlertHandle,
    pub events: EventBusHandle,
    pub rule_set: Arc<RwLock<AlertRuleSet>>,
}
