//! Backup request intake

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: usize,
}

/// POST /backup
///
/// Body: newline-separated repository URLs.
pub async fn submit_backups(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    let queued = gitdav_core::intake::submit(&state.scheduler, &body)?;
    info!(queued, "Accepted backup requests");
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}
