use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::api::{self, AppState, SharedState};
use super::deploy::deploy_router;
use super::session::session_router;
use crate::config::Config;

pub const INDEX_PATH: &str = "/web/index.html";

/// Build the full application router: deploy endpoint, operator API and UI.
pub fn build_router(state: SharedState) -> Router {
    let web_dir = state.config.server.web_dir.clone();

    deploy_router(&state.config)
        .merge(session_router())
        .merge(api::api_router(state.clone()))
        .nest_service("/web", ServeDir::new(web_dir))
        .fallback(redirect_to_index)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Anything unrouted lands on the UI entry page.
async fn redirect_to_index() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, INDEX_PATH)])
}

/// `":8080"` style addresses bind on all interfaces.
pub fn bind_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Start the server and run until Ctrl+C or SIGTERM.
pub async fn start_server(config: Config) -> Result<()> {
    config.ensure_directories()?;

    let addr = bind_addr(&config.server.addr);
    let state = Arc::new(AppState::new(config));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        script_dir = %state.config.server.script_dir.display(),
        upload_dir = %state.config.server.upload_dir.display(),
        "deployhook listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutting down");
}
