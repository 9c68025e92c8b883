//! Status endpoint
//!
//! A small axum app exposing liveness and operational numbers, plus a POST
//! endpoint the admin shell can forward command lines to. Meant to bind on
//! loopback; anything fancier (auth, TLS) belongs in front of it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_admin::{AdminApi, Command};
use relay_health::{HealthMonitor, HealthStatus};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<AdminApi>,
    pub monitor: Arc<HealthMonitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .route("/admin", post(admin_command))
        .with_state(state)
}

/// Serve until cancelled
pub async fn serve(bind: &str, state: AppState, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind, "status endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let report = state.monitor.report();
    let code = match report.status {
        HealthStatus::Healthy | HealthStatus::Elevated => StatusCode::OK,
        HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        code,
        Json(serde_json::json!({
            "status": report.status,
            "eligible_senders": report.eligible_senders,
            "queue_len": report.queue_len,
            "circuit_open": report.circuit_open,
        })),
    )
}

async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let status = state
        .admin
        .status()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let report = state.monitor.report();

    Ok(Json(serde_json::json!({
        "paused": status.paused,
        "accepting_normal": status.accepting_normal,
        "store": status.store,
        "pipeline": {
            "events_new": status.pipeline.events_new,
            "events_edit": status.pipeline.events_edit,
            "events_delete": status.pipeline.events_delete,
            "copies_enqueued": status.pipeline.copies_enqueued,
            "filtered": status.pipeline.filtered,
            "images_blocked": status.pipeline.images_blocked,
            "queue_overflow": status.pipeline.queue_overflow,
        },
        "dispatch": {
            "enqueued": status.dispatch.enqueued,
            "done": status.dispatch.done,
            "retried": status.dispatch.retried,
            "failed": status.dispatch.failed,
            "cancelled": status.dispatch.cancelled,
            "rate_limited": status.dispatch.rate_limited,
            "in_flight": status.dispatch.in_flight,
        },
        "health": {
            "status": report.status,
            "throughput": report.throughput,
            "error_rate_ema": report.error_rate_ema,
            "alerts": report.recent_alerts,
        },
    })))
}

/// Run one admin command line, replying with the textual result
async fn admin_command(State(state): State<AppState>, body: String) -> (StatusCode, String) {
    let command = match Command::parse(&body) {
        Ok(command) => command,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()),
    };
    match command.run(&state.admin) {
        Ok(reply) => (StatusCode::OK, reply),
        Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    }
}
