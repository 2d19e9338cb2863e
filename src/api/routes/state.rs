//! `GET /api/state`

use axum::{extract::State, Json};

use crate::api::state::ApiState;
use crate::events::snapshot::StateSnapshot;

/// GET /api/state
pub async fn get_state(State(state): State<ApiState>) -> Json<StateSnapshot> {
    Json(state.events.full_snapshot().await)
}
