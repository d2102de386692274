use super::routers::{AppState, routes};
use crate::config::ServerConfig;
use crate::error::{PaymentError, Result};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// The full application: routes plus timeout, body limit and request tracing.
pub fn app(state: AppState, config: &ServerConfig) -> Result<Router> {
    let body_limit = config
        .body_limit_mb
        .checked_mul(1024 * 1024)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "body limit of {} MB is too large",
                config.body_limit_mb
            ))
        })?;
    Ok(routes(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http()))
}

pub async fn start(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = app(state, config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = config.port, "http: server is running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("http: server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "http: failed to install CTRL+C handler");
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
                warn!(error = %err, "http: failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("http: received ctrl+C signal"),
        _ = terminate => info!("http: received terminate signal"),
    }
}
