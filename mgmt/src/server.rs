// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! The HTTP control plane.
//!
//! Three mutating endpoints decode a workload manifest per Content-Type
//! and hand it to the reconciler; `/health` answers without taking the
//! reconciler lock.

use crate::reconcile::{ReconcileError, Reconciler};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use trex_config::{TrexWorkload, decode_workload};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Build the control-plane router.
#[must_use]
pub fn router(reconciler: Arc<Reconciler>) -> Router {
    Router::new()
        .route("/apply", post(apply))
        .route("/update", post(update))
        .route("/delete", post(delete))
        .route("/health", get(health))
        .with_state(reconciler)
}

async fn health() -> &'static str {
    "OK"
}

async fn apply(
    State(reconciler): State<Arc<Reconciler>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let workload = match decode(&headers, &body) {
        Ok(workload) => workload,
        Err(response) => return response,
    };
    respond("apply", reconciler.apply(workload).await)
}

async fn update(
    State(reconciler): State<Arc<Reconciler>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let workload = match decode(&headers, &body) {
        Ok(workload) => workload,
        Err(response) => return response,
    };
    respond("update", reconciler.update(workload).await)
}

async fn delete(
    State(reconciler): State<Arc<Reconciler>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let workload = match decode(&headers, &body) {
        Ok(workload) => workload,
        Err(response) => return response,
    };
    respond("delete", reconciler.delete(&workload.metadata.name).await)
}

fn decode(headers: &HeaderMap, body: &Bytes) -> Result<TrexWorkload, (StatusCode, String)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    decode_workload(content_type, body).map_err(|err| {
        warn!("rejecting undecodable request body: {err}");
        (StatusCode::BAD_REQUEST, format!("invalid request body: {err}"))
    })
}

fn respond(action: &str, result: Result<String, ReconcileError>) -> (StatusCode, String) {
    match result {
        Ok(status_line) => {
            info!("{action} completed: {status_line}");
            (StatusCode::OK, status_line)
        }
        Err(err) if err.is_client_error() => {
            warn!("{action} rejected: {err}");
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            error!("{action} failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Bind and serve the control plane until SIGINT/SIGTERM.
///
/// In-flight operations get [`SHUTDOWN_GRACE`] to drain; after that the
/// process exits forcibly.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve(port: u16, reconciler: Arc<Reconciler>) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("control plane listening on {}", listener.local_addr()?);
    axum::serve(listener, router(reconciler))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server exiting");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(err) => {
            error!("failed to install SIGTERM handler: {err}");
            // fall back to SIGINT only
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received; refusing new requests");

    // bound the drain: a stuck reconcile must not hold the process forever
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        error!("shutdown grace period expired; exiting");
        std::process::exit(1);
    });
}
