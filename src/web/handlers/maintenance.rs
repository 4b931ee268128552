//! Maintenance handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::AuditResponse;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /maintenance/audit - Cross-check every record against the blobs on disk.
#[utoipa::path(
    get,
    path = "/maintenance/audit",
    tag = "maintenance",
    responses(
        (status = 200, description = "Audit report", body = AuditResponse),
        (status = 500, description = "Storage or database failure")
    )
)]
pub async fn audit(State(state): State<Arc<AppState>>) -> Result<Json<AuditResponse>, ApiError> {
    let report = state.files.audit().await?;
    Ok(Json(AuditResponse::from(report)))
}
