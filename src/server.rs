// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! HTTP surfaces: liveness, readiness and Prometheus metrics.
//!
//! - `/healthz` answers 200 while the process is alive
//! - `/readyz` answers 503 until [`Readiness::set_ready`] was called
//! - `/metrics` serves [`crate::metrics::gather_metrics`] in text format
//!
//! Servers stop when the shared cancellation token fires.

use crate::constants::{HEALTHZ_PATH, METRICS_SERVER_PATH, READYZ_PATH};
use crate::metrics::gather_metrics;
use anyhow::{Context as _, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Readiness flag shared between the workers and the health server.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Router with `/healthz` and `/readyz`.
pub fn health_router(readiness: Readiness) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(READYZ_PATH, get(readyz))
        .with_state(readiness)
}

/// Router with `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics))
}

/// Serve `router` on an already bound listener until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = listener.local_addr()?;
    info!(address = %address, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .with_context(|| format!("HTTP server on {address} failed"))?;
    info!(address = %address, "HTTP server stopped");
    Ok(())
}

/// Bind `address` and serve `router` until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(address: SocketAddr, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    serve_listener(listener, router, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn(router: Router) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        tokio::spawn(serve_listener(listener, router, token.clone()));
        (address, token)
    }

    #[tokio::test]
    async fn test_readyz_follows_readiness() {
        let readiness = Readiness::new();
        let (address, token) = spawn(health_router(readiness.clone())).await;
        let client = reqwest::Client::new();

        let healthz = client
            .get(format!("http://{address}/healthz"))
            .send()
            .await
            .unwrap();
        assert_eq!(healthz.status().as_u16(), 200);

        let not_ready = client
            .get(format!("http://{address}/readyz"))
            .send()
            .await
            .unwrap();
        assert_eq!(not_ready.status().as_u16(), 503);

        readiness.set_ready(true);
        let ready = client
            .get(format!("http://{address}/readyz"))
            .send()
            .await
            .unwrap();
        assert_eq!(ready.status().as_u16(), 200);

        token.cancel();
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::record_reconciliation_requeue("ControlPlaneNode", "test");
        let (address, token) = spawn(metrics_router()).await;

        let response = reqwest::get(format!("http://{address}/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("sysreg_deckhouse_io"));

        token.cancel();
    }
}
