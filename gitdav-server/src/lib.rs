//! gitdav server - HTTP intake for backup requests
//!
//! Endpoints:
//! - `POST /backup`: queue newline-separated repository URLs
//! - `GET /status`: queue depth, running backup and recent reports
//! - `GET /health`: liveness

pub mod api;
pub mod error;
pub mod state;

pub use api::create_router;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, ReportLog};
