use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;

use crate::exporter::Exporter;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct AppState {
    exporter: Exporter,
    // Only one collection cycle may be in flight at a time; concurrent
    // scrapes are serialized here.
    scrape_lock: Mutex<()>,
}

pub fn router(exporter: Exporter) -> Router {
    let state = Arc::new(AppState {
        exporter,
        scrape_lock: Mutex::new(()),
    });
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Pull-triggered collection: every scrape of /metrics runs one full cycle
/// and returns the freshly populated registry.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let _guard = state.scrape_lock.lock().await;

    let result = state.exporter.collect().await;
    for error in &result.errors {
        tracing::error!(error = %error, "Stage failed during collection cycle");
    }

    match state.exporter.encode() {
        Ok(body) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

pub async fn serve(bind: &str, exporter: Exporter) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(addr = %listener.local_addr()?, "Serving /metrics");

    axum::serve(listener, router(exporter))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    tracing::info!("Received shutdown signal, exiting");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
