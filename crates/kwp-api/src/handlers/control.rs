//! Session start/stop handlers

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub port: Option<String>,
}

/// Acknowledgement body, `{"ok": true}`
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

/// POST /api/start?port=...
///
/// Stops any running session, then starts one on `port`. Returns as soon as
/// the session worker is spawned; progress is reported on the stream.
pub async fn start_session(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    let port = query.port.unwrap_or_default();
    if port.trim().is_empty() {
        return Err(ApiError::BadRequest("missing port".to_string()));
    }

    info!(port = %port, "Start requested");
    state.session().start(&port).await?;
    Ok(OkResponse::ok())
}

/// POST /api/stop
pub async fn stop_session(State(state): State<AppState>) -> Result<Json<OkResponse>, ApiError> {
    info!("Stop requested");
    state.session().stop().await?;
    Ok(OkResponse::ok())
}
