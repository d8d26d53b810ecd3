use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{MetricSample, TargetId};
use crate::ingest::{target_ref, IngestError, RawMetrics};
use crate::service::{MonitorService, ServiceError, TargetStats};

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<MonitorService>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub samples: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        samples: state.service.store().len(),
    })
}

// ============================================================================
// Submit
// ============================================================================

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default, alias = "server_id")]
    pub target_id: Option<u64>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub metrics: Option<RawMetrics>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub target_id: TargetId,
    pub recorded_at: DateTime<Utc>,
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let metrics = request
        .metrics
        .ok_or_else(|| ApiError::BadRequest("metrics payload is required".to_string()))?;
    let target = target_ref(request.target_id, request.ip_address.as_deref())?;

    let accepted = state.service.submit(target, &metrics).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status: "accepted",
            target_id: accepted.target_id,
            recorded_at: accepted.recorded_at,
        }),
    ))
}

// ============================================================================
// Query
// ============================================================================

#[derive(Deserialize)]
pub struct QueryParams {
    pub target_id: Option<u64>,
    pub hours: Option<u32>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub samples: Vec<MetricSample>,
    pub count: usize,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let samples = state
        .service
        .query(params.target_id.map(TargetId), params.hours.unwrap_or(24))
        .await?;

    Ok(Json(QueryResponse {
        count: samples.len(),
        samples,
    }))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Deserialize)]
pub struct StatsParams {
    pub target_id: Option<u64>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub targets: Vec<TargetStats>,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Json<StatsResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let targets = state.service.stats(params.target_id.map(TargetId)).await?;
    Ok(Json(StatsResponse { targets }))
}

// ============================================================================
// Purge
// ============================================================================

#[derive(Deserialize)]
pub struct PurgeParams {
    pub days: Option<u32>,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub removed: usize,
    pub days: u32,
}

pub async fn purge(
    State(state): State<Arc<AppState>>,
    params: Result<Query<PurgeParams>, QueryRejection>,
) -> Result<Json<PurgeResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let days = params.days.unwrap_or(7);
    let removed = state.service.purge_older_than(days)?;
    Ok(Json(PurgeResponse { removed, days }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(msg) => ApiError::BadRequest(msg),
            IngestError::NotFound(_) => ApiError::NotFound(e.to_string()),
            IngestError::ServiceBusy | IngestError::ShutDown => ApiError::Unavailable(e.to_string()),
            IngestError::Directory(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ServiceError::Storage(_) | ServiceError::Directory(_) => {
                tracing::error!(error = %e, "Request failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
