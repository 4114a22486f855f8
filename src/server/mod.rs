// HTTP surface over the RAG service


use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::rag::{QueryResult, RagService, RawDocument};
use crate::store::{DeletionFilter, Metadata};
use crate::{RagError, Result};

type SharedService = Arc<RagService>;

/// Every failure is reported as 500 with a `detail` message
#[derive(Debug)]
pub struct ApiError(String);

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        Self(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub meta_filter: Metadata,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    ingested: usize,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    status: &'static str,
    deleted: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    documents: u64,
}

/// Routes with request tracing
#[inline]
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/delete", delete(delete_documents))
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn ingest(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<Vec<RawDocument>>, JsonRejection>,
) -> std::result::Result<Json<IngestResponse>, ApiError> {
    let Json(documents) = payload?;
    let ingested = service.ingest(documents).await?;
    Ok(Json(IngestResponse {
        status: "ok",
        ingested,
    }))
}

async fn delete_documents(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<DeleteRequest>, JsonRejection>,
) -> std::result::Result<Json<DeleteResponse>, ApiError> {
    let Json(request) = payload?;
    let deleted = service
        .delete(&DeletionFilter::new(request.meta_filter))
        .await?;
    Ok(Json(DeleteResponse {
        status: "ok",
        deleted,
    }))
}

async fn query(
    State(service): State<SharedService>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResult>, ApiError> {
    let Json(request) = payload?;
    let result = service.query(&request.query, request.top_k).await?;
    Ok(Json(result))
}

async fn health(
    State(service): State<SharedService>,
) -> std::result::Result<Json<HealthResponse>, ApiError> {
    let status = service.status().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        backend: status.backend,
        documents: status.documents,
    }))
}

/// Serve until Ctrl-C
#[inline]
pub async fn serve(addr: SocketAddr, service: SharedService) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
