//! `GET /api/alerts`, `POST /api/alerts/{id}/acknowledge`,
//! `POST /api/alerts/suppress`, `GET`/`PUT /api/alerts/config`.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::alerts::state::AlertId;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::{AlertRuleSet, ApiState};
use crate::api::types::{AcknowledgeResponse, AlertConfigResponse, AlertsResponse, SuppressRequest};
use crate::identity::Fingerprint;

/// GET /api/alerts
pub async fn list_alerts(State(state): State<ApiState>) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        active: state.alerts.active().await,
    })
}

/// POST /api/alerts/{id}/acknowledge
pub async fn acknowledge_alert(Path(id): Path<String>, State(state): State<ApiState>) -> Json<AcknowledgeResponse> {
    let acknowledged = state.alerts.acknowledge(AlertId(id)).await;
    Json(AcknowledgeResponse { acknowledged })
}

/// POST /api/alerts/suppress
pub async fn suppress_alert(State(state): State<ApiState>, Json(body): Json<SuppressRequest>) -> ApiResult<Json<()>> {
    if body.until_seconds == 0 {
        return Err(ApiError::InvalidRequest("untilSeconds must be greater than zero".into()));
    }
    let until = chrono::Utc::now() + chrono::Duration::seconds(body.until_seconds as i64);
    state
        .alerts
        .suppress(Fingerprint::from_wire(&body.scope), body.rule_id, until)
        .await;
    Ok(Json(()))
}

/// GET /api/alerts/config
pub async fn get_alert_config(State(state): State<ApiState>) -> Json<AlertConfigResponse> {
    let rule_set = state.rule_set.read().await;
    Json(AlertConfigResponse {
        rules: rule_set.rules.clone(),
        overrides: rule_set.overrides.clone(),
    })
}

/// PUT /api/alerts/config
pub async fn put_alert_config(State(state): State<ApiState>, Json(body): Json<AlertConfigResponse>) -> ApiResult<Json<()>> {
    for rule in &body.rules {
        rule.validate().map_err(ApiError::InvalidRequest)?;
    }
    for (target, ov) in &body.overrides {
        if !body.rules.iter().any(|r| r.name == ov.rule) {
            return Err(ApiError::InvalidRequest(format!(
                "override for '{target}' references unknown rule '{}'",
                ov.rule
            )));
        }
    }

    {
        let mut rule_set = state.rule_set.write().await;
        *rule_set = AlertRuleSet {
            rules: body.rules.clone(),
            overrides: body.overrides.clone(),
        };
    }
    state.alerts.reload_rules(body.rules, body.overrides).await;
    state.events.publish_configuration_reloaded();
    Ok(Json(()))
}
