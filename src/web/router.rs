//! Router configuration for Web API.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    audit, delete_file, download_file, get_file, list_files, update_file, upload_file,
    verify_file, AppState,
};
use super::middleware::create_cors_layer;
use super::openapi::ApiDoc;

/// Slack on top of the upload limit for multipart framing and form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = (app_state.max_upload_size as usize).saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/", get(list_files).post(upload_file))
        .route(
            "/files/:id",
            get(get_file).patch(update_file).delete(delete_file),
        )
        .route("/files/:id/download", get(download_file))
        .route("/files/:id/verify", get(verify_file));

    let maintenance_routes = Router::new().route("/maintenance/audit", get(audit));

    Router::new()
        .merge(file_routes)
        .merge(maintenance_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_health_router() {
        let _router = create_health_router();
    }

    #[test]
    fn test_create_swagger_router() {
        let _router = create_swagger_router();
    }
}
