//! # API Endpoint Handlers
//!
//! Every handler takes the caller from headers, checks the permission the
//! route needs, and hands off to the service. Identifier parsing and body
//! validation failures come back as `validation_error`.

use super::{
    AppState,
    auth::Caller,
    types::{ApiError, ApiResponse, HealthResponse, RejectRequest},
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use merit_core::{
    Achievement, AchievementContent, AttachmentMeta, ConsistencyReport, HistoryEntry, Permission,
    Reference, ReferenceId, Statistics, StudentId, StudentReport,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn parse_id(raw: &str) -> Result<ReferenceId, ApiError> {
    Ok(ReferenceId::parse(raw)?)
}

// =============================================================================
// HEALTH
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

/// `GET /achievements`: everything visible to the caller.
pub async fn list_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Vec<Achievement>> {
    identity.require(Permission::Read)?;
    ok(state.service.list(identity).await?)
}

/// `POST /achievements`: new Draft owned by the calling student.
pub async fn create_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Result<Json<AchievementContent>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Achievement>>), ApiError> {
    identity.require(Permission::Create)?;
    let Json(content) = body?;
    let created = state.service.create(identity, content).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// `GET /achievements/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<Achievement> {
    identity.require(Permission::Read)?;
    let id = parse_id(&id)?;
    ok(state.service.get(identity, id).await?)
}

/// `PUT /achievements/{id}`: overwrite content while Draft or Rejected.
pub async fn edit_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Result<Json<AchievementContent>, JsonRejection>,
) -> ApiResult<Achievement> {
    identity.require(Permission::Update)?;
    let id = parse_id(&id)?;
    let Json(content) = body?;
    ok(state.service.edit(identity, id, content).await?)
}

/// `DELETE /achievements/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<Reference> {
    identity.require(Permission::Delete)?;
    let id = parse_id(&id)?;
    ok(state.service.delete(identity, id).await?)
}

/// `POST /achievements/{id}/submit`
pub async fn submit_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<Reference> {
    identity.require(Permission::Update)?;
    let id = parse_id(&id)?;
    ok(state.service.submit(identity, id).await?)
}

/// `POST /achievements/{id}/verify`
pub async fn verify_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<Reference> {
    identity.require(Permission::Verify)?;
    let id = parse_id(&id)?;
    ok(state.service.verify(identity, id).await?)
}

/// `POST /achievements/{id}/reject` with `{"rejection_note": ...}`.
pub async fn reject_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> ApiResult<Reference> {
    identity.require(Permission::Verify)?;
    let id = parse_id(&id)?;
    let Json(request) = body?;
    ok(state
        .service
        .reject(identity, id, request.rejection_note)
        .await?)
}

/// `POST /achievements/{id}/attachments` with the stored file's metadata.
pub async fn attachment_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Result<Json<AttachmentMeta>, JsonRejection>,
) -> ApiResult<Achievement> {
    identity.require(Permission::Update)?;
    let id = parse_id(&id)?;
    let Json(meta) = body?;
    ok(state.service.add_attachment(identity, id, meta).await?)
}

/// `GET /achievements/{id}/history`
pub async fn history_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<HistoryEntry>> {
    identity.require(Permission::Read)?;
    let id = parse_id(&id)?;
    ok(state.service.history(identity, id).await?)
}

// =============================================================================
// REPORTS
// =============================================================================

/// `GET /reports/statistics`
pub async fn statistics_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Statistics> {
    identity.require(Permission::Read)?;
    ok(state.service.statistics(identity).await?)
}

/// `GET /reports/student/{id}`
pub async fn student_report_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(student): Path<String>,
) -> ApiResult<StudentReport> {
    identity.require(Permission::Read)?;
    ok(state
        .service
        .student_report(identity, StudentId::new(student))
        .await?)
}

// =============================================================================
// ADMIN
// =============================================================================

/// `GET /admin/consistency`
pub async fn consistency_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<ConsistencyReport> {
    ok(state.service.consistency(identity).await?)
}
