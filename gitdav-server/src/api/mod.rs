//! HTTP API layer
//!
//! `/health` is public; every other endpoint requires the intake token.

pub mod backup;
pub mod health;
pub mod status;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// Header older clients send the raw token in
pub const LEGACY_TOKEN_HEADER: &str = "token";

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/backup", post(backup::submit_backups))
        .route("/status", get(status::get_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(authed)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn auth_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    match presented_token(req.headers()) {
        Some(token) if state.verifier.verify(token) => next.run(req).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

/// Token from `Authorization: Bearer <token>`, else the legacy header
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer.or_else(|| {
        headers
            .get(LEGACY_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ReportLog;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use chrono::{DateTime, Utc};
    use gitdav_core::intake::hash_token;
    use gitdav_core::{
        BackupOutcome, BackupPipeline, BackupReport, BackupService, BackupStore, Cloner,
        CommitDateLookup, ErrorKind, FreshnessOracle, Scheduler, SchedulerConfig, TokenVerifier,
        ZipArchiver,
    };
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    const TOKEN: &str = "hunter2";

    struct NoopCloner;

    #[async_trait]
    impl Cloner for NoopCloner {
        async fn clone_repo(&self, _repo_url: &str, _destination: &Path) -> gitdav_core::Result<()> {
            Ok(())
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl BackupStore for EmptyStore {
        async fn list(&self) -> gitdav_core::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn put(&self, _name: &str, _bytes: axum::body::Bytes) -> gitdav_core::Result<()> {
            Ok(())
        }
    }

    struct NoProvider;

    #[async_trait]
    impl CommitDateLookup for NoProvider {
        async fn latest_commit_date(&self, repo_url: &str) -> gitdav_core::Result<DateTime<Utc>> {
            Err(gitdav_core::Error::NotSupported(repo_url.to_string()))
        }
    }

    fn test_state() -> AppState {
        let store: Arc<dyn BackupStore> = Arc::new(EmptyStore);
        let oracle = FreshnessOracle::new(Arc::clone(&store), Arc::new(NoProvider));
        let pipeline = BackupPipeline::new(
            std::env::temp_dir().join("gitdav-server-unused"),
            Arc::new(NoopCloner),
            Arc::new(ZipArchiver::stored()),
            store,
        );
        let scheduler = Scheduler::new(
            BackupService::new(oracle, Arc::new(pipeline)),
            SchedulerConfig::default(),
        );
        let verifier = TokenVerifier::from_hex(&hash_token(TOKEN)).unwrap();
        AppState::new(scheduler, verifier, ReportLog::new(10))
    }

    fn post_backup(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/backup")
            .header("Authorization", format!("Bearer {}", TOKEN))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_missing_or_wrong_token_is_unauthorized() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/backup")
                    .body(Body::from("https://github.com/a/b.git"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/backup")
                    .header("Authorization", "Bearer nope")
                    .body(Body::from("https://github.com/a/b.git"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.scheduler.status().queued, 0);
    }

    #[tokio::test]
    async fn test_bearer_token_queues_repositories() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(post_backup(
                "https://github.com/a/b.git\n\n  https://github.com/a/c  \n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["queued"], 2);
        assert_eq!(state.scheduler.status().queued, 2);
    }

    #[tokio::test]
    async fn test_legacy_token_header_is_accepted() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/backup")
                    .header(LEGACY_TOKEN_HEADER, TOKEN)
                    .body(Body::from("https://github.com/a/b.git"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(state.scheduler.status().queued, 1);
    }

    #[tokio::test]
    async fn test_bad_bodies_are_rejected() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app.clone().oneshot(post_backup(" \n\n")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_backup("https://github.com/a/b.git\nhttps://github.com/a/.git\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("line 2"));
        assert_eq!(state.scheduler.status().queued, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_internal_error() {
        let state = test_state();
        state.scheduler.close();
        let app = create_router(state);

        let response = app
            .oneshot(post_backup("https://github.com/a/b.git"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_status_lists_recent_reports() {
        let state = test_state();
        state.scheduler.enqueue("https://github.com/a/b.git").unwrap();
        state.history.record(BackupReport {
            repo_url: "https://github.com/a/c.git".into(),
            outcome: BackupOutcome::Created {
                archive: "c20240101120000.zip".into(),
                size: 10,
            },
            started_at: Utc::now(),
            finished_at: Utc::now(),
        });
        state.history.record(BackupReport {
            repo_url: "https://github.com/a/d.git".into(),
            outcome: BackupOutcome::Failed {
                kind: ErrorKind::Network,
                message: "connection reset".into(),
            },
            started_at: Utc::now(),
            finished_at: Utc::now(),
        });
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .header("Authorization", format!("Bearer {}", TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["queued"], 1);
        assert_eq!(body["accepting"], true);
        assert!(body["running"].is_null());
        assert_eq!(body["failures"], 1);
        assert_eq!(body["recent"][0]["outcome"]["status"], "created");
        assert_eq!(body["recent"][1]["outcome"]["kind"], "network");
    }

    #[test]
    fn test_bearer_wins_over_legacy_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer one".parse().unwrap());
        headers.insert(LEGACY_TOKEN_HEADER, "two".parse().unwrap());
        assert_eq!(presented_token(&headers), Some("one"));

        headers.remove("authorization");
        assert_eq!(presented_token(&headers), Some("two"));
    }
}
