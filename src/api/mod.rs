//! REST + WebSocket API for the processing pipeline.
//!
//! Authentication (OAuth token exchange, session validation) lives in an
//! upstream gateway; this server trusts the `X-User-Id` header as the caller
//! identity and applies the meeting access gate on every meeting-scoped
//! route.

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::http::HeaderMap;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use crate::ai::AiService;
use crate::artifacts::BlobStore;
use crate::db::Db;
use crate::pipeline::{ProcessingPipeline, ProgressBus};

use error::ApiError;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub blobs: BlobStore,
    pub pipeline: Arc<ProcessingPipeline>,
    pub progress: Arc<ProgressBus>,
    pub ai: Arc<dyn AiService>,
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", get(service_info))
            .merge(routes::processing::router(state.clone()))
            .merge(routes::documents::router(state.clone()))
            .merge(routes::health::router(state))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self) -> Result<()> {
        let app = Self::router(self.state);

        let listener =
            tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  POST /meetings/:id/process           - Start the processing pipeline");
        info!("  POST /meetings/:id/process/cancel    - Cancel a running pipeline");
        info!("  POST /meetings/:id/process/retry     - Retry a failed pipeline");
        info!("  GET  /meetings/:id/processing-status - Pipeline status from stored state");
        info!("  GET  /meetings/:id/documents         - List generated minutes documents");
        info!("  GET  /meetings/:id/events            - WebSocket progress stream");
        info!("  GET  /ai/health                      - AI service health probe");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "minuted",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Caller identity from the gateway-provided header.
pub(crate) fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))
}
