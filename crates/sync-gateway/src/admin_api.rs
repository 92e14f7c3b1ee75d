//! Admin API for the sync gateway

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_policy_core::prelude::*;
use tracing::info;

use crate::{CommitReceipt, GatewayStats, RejectionEntry, WriteGateway};

/// Header carried into the metadata of every write
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Admin API state
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<WriteGateway>,
}

impl AdminState {
    pub fn new(gateway: Arc<WriteGateway>) -> Self {
        Self { gateway }
    }
}

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub policy: &'static str,
}

/// Stats response
#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: GatewayStats,
    pub rejection_rate: f64,
}

/// Body of `POST /evaluate`
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub new: Document,
    #[serde(default)]
    pub previous: Option<Document>,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectionsQuery {
    #[serde(default = "default_rejections_limit")]
    pub limit: usize,
}

fn default_rejections_limit() -> usize {
    50
}

/// Body of `POST /_bulk_docs`
#[derive(Debug, Deserialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<BulkDoc>,
}

/// One document of a bulk write; `_deleted: true` deletes it
#[derive(Debug, Deserialize)]
pub struct BulkDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub body: Document,
}

/// Per-document outcome of a bulk write
#[derive(Debug, Serialize)]
pub struct BulkDocResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbidden: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkDocResult {
    fn new(id: String, result: Result<CommitReceipt>) -> Self {
        let mut entry = Self {
            id,
            generation: None,
            forbidden: None,
            error: None,
        };
        match result {
            Ok(receipt) => entry.generation = Some(receipt.generation),
            Err(GatewayError::Forbidden(forbidden)) => entry.forbidden = Some(forbidden.reason),
            Err(e) => entry.error = Some(e.to_string()),
        }
        entry
    }
}

/// Error as an HTTP response
///
/// Rejections use the `{"forbidden": reason}` body replicating clients
/// expect; everything else answers `{"error": message}`.
pub enum ApiError {
    Gateway(GatewayError),
    InvalidBody(String),
}

type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, key, message) = match self {
            Self::InvalidBody(message) => (StatusCode::BAD_REQUEST, "error", message),
            Self::Gateway(GatewayError::Forbidden(forbidden)) => {
                (StatusCode::FORBIDDEN, "forbidden", forbidden.reason)
            }
            Self::Gateway(e) => {
                let status = match e {
                    GatewayError::Configuration { .. } => StatusCode::BAD_REQUEST,
                    GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "error", e.to_string())
            }
        };
        (status, Json(serde_json::json!({ key: message }))).into_response()
    }
}

fn request_metadata(headers: &HeaderMap) -> Metadata {
    let metadata = Metadata::new("admin_api");
    match headers.get(CORRELATION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => metadata.with_correlation_id(id),
        None => metadata,
    }
}

async fn health(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        policy: state.gateway.policy_name(),
    })
}

async fn live() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AdminState>) -> ApiResult<&'static str> {
    state.gateway.health_check().await?;
    Ok("OK")
}

async fn stats(State(state): State<AdminState>) -> Json<StatsResponse> {
    let stats = state.gateway.stats();
    let rejection_rate = if stats.evaluated > 0 {
        stats.rejected as f64 / stats.evaluated as f64 * 100.0
    } else {
        0.0
    };
    Json(StatsResponse {
        stats,
        rejection_rate,
    })
}

async fn rejections(
    State(state): State<AdminState>,
    Query(query): Query<RejectionsQuery>,
) -> Json<Vec<RejectionEntry>> {
    Json(state.gateway.recent_rejections(query.limit).await)
}

async fn drain_rejections(State(state): State<AdminState>) -> Json<Vec<RejectionEntry>> {
    Json(state.gateway.drain_rejections().await)
}

async fn evaluate(
    State(state): State<AdminState>,
    body: std::result::Result<Json<EvaluateRequest>, JsonRejection>,
) -> ApiResult<Json<Decision>> {
    let Json(request) = body?;
    Ok(Json(state.gateway.dry_run(
        &request.new,
        request.previous.as_ref(),
        request.delete,
    )))
}

async fn put_document(
    State(state): State<AdminState>,
    Path(doc_id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Json<Document>, JsonRejection>,
) -> ApiResult<Json<CommitReceipt>> {
    let Json(body) = body?;
    let request = WriteRequest::upsert(doc_id, body).with_metadata(request_metadata(&headers));
    Ok(Json(state.gateway.commit(request).await?))
}

async fn delete_document(
    State(state): State<AdminState>,
    Path(doc_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<CommitReceipt>> {
    let request = WriteRequest::delete(doc_id).with_metadata(request_metadata(&headers));
    Ok(Json(state.gateway.commit(request).await?))
}

async fn bulk_docs(
    State(state): State<AdminState>,
    headers: HeaderMap,
    body: std::result::Result<Json<BulkDocsRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<BulkDocResult>>> {
    let Json(request) = body?;
    let (ids, requests): (Vec<_>, Vec<_>) = request
        .docs
        .into_iter()
        .map(|doc| {
            let request = WriteRequest::upsert(doc.id.clone(), doc.body)
                .with_metadata(request_metadata(&headers));
            (doc.id, request)
        })
        .unzip();

    let results = state.gateway.commit_batch(requests).await?;
    Ok(Json(
        ids.into_iter()
            .zip(results)
            .map(|(id, result)| BulkDocResult::new(id, result))
            .collect(),
    ))
}

/// Build the admin router
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/stats", get(stats))
        .route("/rejections", get(rejections).delete(drain_rejections))
        .route("/evaluate", post(evaluate))
        .route("/documents/:doc_id", put(put_document).delete(delete_document))
        .route("/_bulk_docs", post(bulk_docs))
        .with_state(state)
}

/// Run admin server
pub async fn run_admin_server(listen: &str, state: AdminState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| GatewayError::config(format!("cannot bind admin API to {listen}: {e}")))?;
    info!(listen, "Admin API started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("admin API failed: {e}")))?;

    info!("Admin API stopped");
    Ok(())
}
