use axum::{extract::State, Json};
use gitdav_core::BackupReport;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queued: usize,
    pub running: Option<String>,
    pub accepting: bool,
    /// Failed requests among `recent`
    pub failures: usize,
    pub recent: Vec<BackupReport>,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.scheduler.status();
    let recent = state.history.recent();
    Json(StatusResponse {
        queued: status.queued,
        running: status.running,
        accepting: status.accepting,
        failures: recent.iter().filter(|r| r.outcome.is_failure()).count(),
        recent,
    })
}
