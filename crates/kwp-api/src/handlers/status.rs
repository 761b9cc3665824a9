//! Session status handler

use axum::extract::State;
use axum::Json;
use kwp_core::SessionStatus;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub session: SessionStatus,
    /// Connected stream viewers
    pub subscribers: usize,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        session: state.session().status(),
        subscribers: state.hub().subscriber_count(),
    })
}
