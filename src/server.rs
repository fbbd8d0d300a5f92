//! HTTP endpoints for Prometheus scraping and liveness checks

use std::net::SocketAddr;

use axum::{http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::encoding::text::encode;
use tracing::info;

use crate::controller::metrics::REGISTRY;
use crate::error::{Error, Result};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

async fn metrics() -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &REGISTRY) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
}

/// Serve `/metrics` and `/healthz` until the process exits.
pub async fn run_server(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("cannot bind {addr}: {e}")))?;
    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router())
        .await
        .map_err(|e| Error::ConfigError(format!("metrics server failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_ok() {
        let response = metrics().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            OPENMETRICS_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn test_healthz() {
        assert_eq!(healthz().await, "ok");
    }
}
