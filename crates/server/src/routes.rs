use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fins_core::{AccountId, IngestError, JobId, JobStatus, OwnerId};
use fins_pipeline::IngestionService;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::error;

pub const OWNER_HEADER: &str = "x-owner-id";

pub struct AppState {
    pub ingestion: IngestionService,
}

pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Ingest(IngestError),
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        AppError::Ingest(e)
    }
}

fn status_for(e: &IngestError) -> StatusCode {
    match e {
        IngestError::Rejected(_) | IngestError::Parse(_) => StatusCode::BAD_REQUEST,
        IngestError::NotFound(_) => StatusCode::NOT_FOUND,
        IngestError::State { .. } | IngestError::DuplicateConstraint(_) => StatusCode::CONFLICT,
        IngestError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        IngestError::Storage(_) | IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("Missing {OWNER_HEADER} header"),
            ),
            AppError::Ingest(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    error!("request failed: {e}");
                }
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn owner_from(headers: &HeaderMap) -> Result<OwnerId, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(OwnerId::new)
        .ok_or(AppError::Unauthorized)
}

fn job_id_from(raw: &str) -> Result<JobId, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

pub fn router(state: AppState, max_upload_bytes: u64) -> Router {
    let body_limit = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/api/statements", post(upload_statement))
        .route("/api/jobs/{id}", get(job_status))
        .route("/api/jobs/{id}/confirm", post(confirm_account))
        .route("/api/accounts/{id}/recategorize", post(recategorize_account))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(Arc::new(state))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobId,
}

/// POST /api/statements?filename=statement.csv with the raw file as body.
async fn upload_statement(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let owner = owner_from(&headers)?;
    let filename = query.filename.unwrap_or_default();
    let job_id = state.ingestion.start_ingestion(&owner, &body, &filename).await?;
    Ok((StatusCode::ACCEPTED, Json(UploadResponse { job_id })))
}

/// GET /api/jobs/{id}
async fn job_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, AppError> {
    let owner = owner_from(&headers)?;
    let status = state.ingestion.get_status(job_id_from(&id)?, &owner).await?;
    Ok(Json(status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmRequest {
    pub account_id: Option<i64>,
    pub create_new: bool,
    pub new_account_name: Option<String>,
}

/// POST /api/jobs/{id}/confirm
async fn confirm_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Result<StatusCode, AppError> {
    let owner = owner_from(&headers)?;
    state
        .ingestion
        .confirm_account(
            job_id_from(&id)?,
            &owner,
            req.account_id.map(AccountId),
            req.create_new,
            req.new_account_name,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/accounts/{id}/recategorize
async fn recategorize_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let owner = owner_from(&headers)?;
    let updated = state.ingestion.recategorize(&owner, AccountId(id)).await?;
    Ok(Json(json!({ "updated": updated })))
}
