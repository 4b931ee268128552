//! OpenAPI documentation for the file registry API.

use utoipa::OpenApi;

use super::dto::{
    AuditResponse, DeleteResponse, FileResponse, UpdateFileRequest, UploadForm, VerifyResponse,
};
use super::handlers;

/// OpenAPI document, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "filereg API",
        description = "File metadata registry with consistent blob storage",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    paths(
        handlers::files::upload_file,
        handlers::files::list_files,
        handlers::files::get_file,
        handlers::files::update_file,
        handlers::files::delete_file,
        handlers::files::download_file,
        handlers::files::verify_file,
        handlers::maintenance::audit,
    ),
    components(
        schemas(
            FileResponse,
            DeleteResponse,
            VerifyResponse,
            AuditResponse,
            UpdateFileRequest,
            UploadForm,
        )
    ),
    tags(
        (name = "files", description = "File upload, lookup, update and deletion"),
        (name = "maintenance", description = "Consistency checks"),
    )
)]
pub struct ApiDoc;
