//! Serve command - run the scheduler and HTTP intake

use anyhow::Context;
use clap::Args;
use gitdav_core::{Config, Scheduler, Secrets, TokenVerifier};
use gitdav_server::{create_router, AppState, ReportLog};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use super::build_service;

/// Accept backup requests over HTTP and process them in the background
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides config and env)
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        let secrets = Secrets::load_with_overrides()?;
        secrets.require_all()?;

        let verifier = TokenVerifier::from_hex(secrets.intake.token_hash.as_deref().unwrap_or(""))?;
        let service = build_service(config, &secrets)?;

        let scheduler = Scheduler::new(service, config.scheduler.clone());
        let history = ReportLog::new(config.scheduler.report_history);
        let follower = history.follow(scheduler.subscribe());

        let (stop_tx, mut stop_rx) = watch::channel(());
        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .run(async move {
                        let _ = stop_rx.changed().await;
                    })
                    .await;
            })
        };

        let app = create_router(AppState::new(scheduler, verifier, history));
        let listener = TcpListener::bind(config.server.bind.as_str())
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind))?;
        info!(addr = %listener.local_addr()?, "Listening for backup requests");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        let _ = stop_tx.send(());
        runner.await.context("Scheduler task failed")?;
        follower.abort();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
