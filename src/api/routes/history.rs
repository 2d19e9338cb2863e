//! `GET /api/metrics/history/{kind}/{id}`

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::state::ApiState;
use crate::api::types::{HistoryQuery, HistoryResponse};

/// GET /api/metrics/history/{kind}/{id}?metric=&from=&to=&points=
///
/// `kind` is accepted but not validated against the fingerprint's actual
/// kind — it exists for URL readability; the
/// Metrics Store is keyed purely by fingerprint + metric name.
pub async fn get_history(
    Path((_kind, id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
    State(state): State<ApiState>,
) -> Json<HistoryResponse> {
    let points = state
        .metrics
        .query_range(id.clone(), query.metric.clone(), query.from, query.to, query.points, query.points * 4)
        .await;

    Json(HistoryResponse {
        fingerprint: id,
        metric: query.metric,
        points,
    })
}
