//! File handlers for Web API.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use validator::Validate;

use crate::file::FileChanges;
use crate::web::dto::{
    DeleteResponse, FileResponse, ListQuery, UpdateFileRequest, UploadComment, UploadQuery,
    ValidatedJson, VerifyResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are dropped and quotes/backslashes replaced in the
/// plain `filename`; non-ASCII names also get an RFC 5987 `filename*`.
pub(crate) fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// POST /files/ - Upload a file.
///
/// Request body: multipart/form-data with a "file" part and an optional
/// "comment" field. The comment may also be given as a query parameter.
#[utoipa::path(
    post,
    path = "/files/",
    tag = "files",
    params(UploadQuery),
    request_body(content = crate::web::dto::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = FileResponse),
        (status = 400, description = "Missing file, invalid name, unsafe path or file too large"),
        (status = 409, description = "A blob already exists at the target path"),
        (status = 422, description = "Comment too long or contains control characters"),
        (status = 500, description = "Storage or database failure")
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<FileResponse>, ApiError> {
    let mut filename: Option<String> = None;
    let mut comment: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            tracing::warn!("Failed to read file content: {}", e);
                            ApiError::bad_request("Failed to read file")
                        })?
                        .to_vec(),
                );
            }
            "comment" => {
                comment = Some(field.text().await.map_err(|e| {
                    tracing::warn!("Failed to read comment: {}", e);
                    ApiError::bad_request("Invalid comment")
                })?);
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let content = content.ok_or_else(|| ApiError::bad_request("No file content"))?;

    if content.len() as u64 > state.max_upload_size {
        let max_mb = state.max_upload_size / 1024 / 1024;
        return Err(ApiError::bad_request(format!(
            "File too large (max {}MB)",
            max_mb
        )));
    }

    let comment = UploadComment {
        comment: comment.or(query.comment),
    };
    comment
        .validate()
        .map_err(ApiError::from_validation_errors)?;

    let record = state
        .files
        .create(&content, &filename, comment.comment)
        .await?;

    Ok(Json(FileResponse::from(record)))
}

/// GET /files/ - List files ordered by id.
#[utoipa::path(
    get,
    path = "/files/",
    tag = "files",
    params(ListQuery),
    responses(
        (status = 200, description = "File records", body = [FileResponse]),
        (status = 400, description = "Negative offset or limit")
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let records = state.files.list(query.offset, query.limit).await?;
    Ok(Json(records.into_iter().map(FileResponse::from).collect()))
}

/// GET /files/:id - Get a file record by id or name.
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Numeric file ID, or file name")
    ),
    responses(
        (status = 200, description = "File record", body = FileResponse),
        (status = 404, description = "File not found")
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let record = state.files.resolve(&key).await?;
    Ok(Json(FileResponse::from(record)))
}

/// PATCH /files/:id - Rename, relocate or re-comment a file.
#[utoipa::path(
    patch,
    path = "/files/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    request_body = UpdateFileRequest,
    responses(
        (status = 200, description = "Updated record", body = FileResponse),
        (status = 400, description = "Invalid name or unsafe path"),
        (status = 404, description = "File not found"),
        (status = 409, description = "Target path is occupied"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Storage or database failure, or unrepaired inconsistency")
    )
)]
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateFileRequest>,
) -> Result<Json<FileResponse>, ApiError> {
    let changes = FileChanges {
        name: req.name,
        directory: req.path.map(PathBuf::from),
        comment: req.comment.map(Some),
    };

    let record = state.files.update(id, changes).await?;
    Ok(Json(FileResponse::from(record)))
}

/// DELETE /files/:id - Delete a file by id or name.
#[utoipa::path(
    delete,
    path = "/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Numeric file ID, or file name")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 404, description = "File not found"),
        (status = 500, description = "Storage or database failure, or unrepaired inconsistency")
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let record = state.files.resolve(&key).await?;
    state.files.delete(record.id).await?;
    Ok(Json(DeleteResponse::deleted()))
}

/// GET /files/:id/download - Download a file's content.
#[utoipa::path(
    get,
    path = "/files/{id}/download",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File or blob not found")
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response<Body>, ApiError> {
    let (record, content) = state.files.read_content(id).await?;
    let filename = record.file_name();

    let content_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&filename),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// GET /files/:id/verify - Check a file's blob against its record.
#[utoipa::path(
    get,
    path = "/files/{id}/verify",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Blob status", body = VerifyResponse),
        (status = 404, description = "File not found")
    )
)]
pub async fn verify_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let status = state.files.verify(id).await?;
    Ok(Json(VerifyResponse::new(id, status)))
}
