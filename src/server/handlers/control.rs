//! Status and link control.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::relay::RelayStatus;

use super::super::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: RelayStatus,
    pub started_at: String,
}

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.relay.status(),
        started_at: state.started_at.to_rfc3339(),
    })
}

/// POST /api/rescan
pub async fn rescan(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.relay.request_rescan();
    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
pub struct DisplayNameRequest {
    pub name: String,
}

/// PUT /api/display-name
pub async fn display_name(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DisplayNameRequest>,
) -> Json<Value> {
    let name = state.relay.set_display_name(&request.name);
    Json(json!({ "success": true, "name": name }))
}
