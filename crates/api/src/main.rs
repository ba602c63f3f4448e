//! Bulwark - resilient integration gateway
//!
//! Main entry point for the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use bulwark_server::utils::logging::{init_logging, LogFormat};
use bulwark_server::{router, AppContext};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so RUST_LOG and BULWARK_LOG_FORMAT apply
    let dotenv = dotenvy::dotenv();
    init_logging(LogFormat::from_env());
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => info!(error = %err, "no .env file loaded"),
    }

    let config = bulwark_infra::config::load().context("failed to load configuration")?;
    let context = Arc::new(AppContext::new(config).context("failed to build application context")?);

    let mut health_scheduler = context.health_scheduler();
    health_scheduler.start().await.context("failed to start health scheduler")?;
    let mut flush_scheduler = context.flush_scheduler();
    flush_scheduler.start().await.context("failed to start flush scheduler")?;

    let bind_addr = context.config.server.bind_addr.clone();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, version = bulwark_server::context::VERSION, "bulwark listening");

    let served = axum::serve(listener, router(context.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = health_scheduler.stop().await {
        warn!(error = %err, "health scheduler did not stop cleanly");
    }
    match flush_scheduler.stop().await {
        Ok(report) => info!(
            flushed = report.flushed,
            requeued = report.requeued,
            dropped = report.dropped,
            "final event flush complete"
        ),
        Err(err) => error!(error = %err, "flush scheduler did not stop cleanly"),
    }

    served.context("server error")?;
    info!("bulwark stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
