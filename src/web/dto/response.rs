//! Response DTOs for Web API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::file::{AuditReport, BlobStatus, FileRecord};

/// File record as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: i64,
    /// Base name without extension.
    pub name: String,
    /// Extension with its leading dot, or empty.
    pub extension: String,
    /// Size in bytes.
    pub size: i64,
    /// Absolute path of the stored blob.
    pub path: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
    pub updated_at: Option<String>,
    pub comment: Option<String>,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            extension: record.extension,
            size: record.size,
            path: record.path,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.map(|t| t.to_rfc3339()),
            comment: record.comment,
        }
    }
}

/// Confirmation body for a delete.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub detail: String,
}

impl DeleteResponse {
    pub fn deleted() -> Self {
        Self {
            detail: "File deleted".to_string(),
        }
    }
}

/// Blob check result for one record.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub id: i64,
    /// One of `ok`, `missing`, `size_mismatch`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_size: Option<u64>,
}

impl VerifyResponse {
    pub fn new(id: i64, status: BlobStatus) -> Self {
        let (expected_size, actual_size) = match status {
            BlobStatus::SizeMismatch { expected, actual } => (Some(expected), Some(actual)),
            _ => (None, None),
        };
        Self {
            id,
            status: status.as_str().to_string(),
            expected_size,
            actual_size,
        }
    }
}

/// Audit summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditResponse {
    pub records_checked: usize,
    pub clean: bool,
    /// Records whose blob is missing or the wrong size.
    pub dangling_records: Vec<VerifyResponse>,
    /// Blobs no record points at.
    pub orphan_blobs: Vec<String>,
}

impl From<AuditReport> for AuditResponse {
    fn from(report: AuditReport) -> Self {
        Self {
            records_checked: report.records_checked,
            clean: report.is_clean(),
            dangling_records: report
                .dangling_records
                .into_iter()
                .map(|d| VerifyResponse::new(d.id, d.status))
                .collect(),
            orphan_blobs: report
                .orphan_blobs
                .into_iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }
}
