use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::Collection;
use crate::jobs::{Job, JobStatus};
use crate::limit::RateLimiter;
use crate::preview::{BatchRequest, PreviewWarnings, RowData};
use crate::services::{BatchError, BatchService, ExportRow};

/// Shared-secret header every admin batch route requires.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<BatchService>,
    pub admin_key: Option<String>,
    pub limiter: Arc<RateLimiter>,
}

impl BatchError {
    /// Convert a BatchError to an HTTP StatusCode.
    fn status_code(&self) -> StatusCode {
        match self {
            BatchError::NotFound => StatusCode::NOT_FOUND,
            BatchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BatchError::EmptySelection => StatusCode::BAD_REQUEST,
            BatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

pub fn router(service: Arc<BatchService>, admin_key: Option<String>) -> Router {
    let state = ApiState {
        service,
        admin_key,
        limiter: Arc::new(RateLimiter::default()),
    };

    // Preview and commit carry the rate limit; job polling and exports don't
    let limited = Router::new()
        .route("/admin/batch/preview", post(preview))
        .route("/admin/batch/commit", post(commit))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(limited)
        .route("/admin/batch/jobs", get(list_jobs))
        .route("/admin/batch/jobs/:job_id", get(get_job))
        .route("/admin/batch/jobs/:job_id/rollback", post(rollback_job))
        .route("/admin/batch/list-cocktails", get(list_cocktails))
        .route("/admin/batch/list-ingredients", get(list_ingredients))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_key))
        .with_state(state)
}

/// Gate every admin route on the shared secret. Session auth and the admin
/// role are the platform gateway's job; this header is the service's own
/// check.
async fn require_admin_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_key.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Admin key not configured".to_string(),
        )
            .into_response();
    };

    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        return (StatusCode::UNAUTHORIZED, "Invalid admin key".to_string()).into_response();
    }

    next.run(request).await
}

async fn rate_limit(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    // All admins share one key, so distinguish callers by forwarded address
    let caller = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
        .to_string();

    if !state.limiter.allow(&caller).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded".to_string(),
        )
            .into_response();
    }

    next.run(request).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewResponse {
    job_id: String,
    will_update: usize,
    skipped: u64,
    missing: Vec<String>,
    rows: Vec<RowData>,
    warnings: PreviewWarnings,
}

async fn preview(
    State(state): State<ApiState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<PreviewResponse>, BatchError> {
    let preview = state.service.preview(&req).await?;

    Ok(Json(PreviewResponse {
        // Ephemeral ID so the admin UI can key the review table; nothing is
        // stored under it
        job_id: format!("temp-{}", uuid::Uuid::new_v4()),
        will_update: preview.will_update,
        skipped: preview.skipped,
        missing: preview.missing,
        rows: preview.rows,
        warnings: preview.warnings,
    }))
}

#[derive(Deserialize)]
struct CommitRequest {
    #[serde(flatten)]
    request: BatchRequest,
    /// Restrict the commit to a subset of the previewed row IDs
    #[serde(default, rename = "selectIds")]
    select_ids: Option<Vec<String>>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    job_id: String,
    status: JobStatus,
}

async fn commit(
    State(state): State<ApiState>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, BatchError> {
    let job = state
        .service
        .commit(&req.request, req.select_ids.as_deref(), req.note)
        .await?;

    Ok(Json(CommitResponse {
        job_id: job.id,
        status: job.status,
    }))
}

async fn list_jobs(State(state): State<ApiState>) -> Result<Json<Vec<Job>>, BatchError> {
    Ok(Json(state.service.recent_jobs().await?))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, BatchError> {
    Ok(Json(state.service.get_job(&job_id).await?))
}

async fn rollback_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<CommitResponse>, BatchError> {
    let job = state.service.rollback(&job_id).await?;

    Ok(Json(CommitResponse {
        job_id: job.id,
        status: job.status,
    }))
}

async fn list_cocktails(State(state): State<ApiState>) -> Result<Json<Vec<ExportRow>>, BatchError> {
    Ok(Json(state.service.export_rows(Collection::Cocktails).await?))
}

async fn list_ingredients(
    State(state): State<ApiState>,
) -> Result<Json<Vec<ExportRow>>, BatchError> {
    Ok(Json(state.service.export_rows(Collection::Ingredients).await?))
}
