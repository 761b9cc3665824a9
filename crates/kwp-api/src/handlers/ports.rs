//! Port enumeration handler

use axum::extract::State;
use axum::Json;
use kwp_core::PortInfo;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/ports
pub async fn list_ports(State(state): State<AppState>) -> Result<Json<Vec<PortInfo>>, ApiError> {
    let ports = state.session().list_ports().await?;
    Ok(Json(ports))
}
