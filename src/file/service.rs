//! File service.
//!
//! Coordinates the blob store and the metadata store so that every record
//! points at exactly one existing blob:
//! - create writes the blob first and removes it again if the insert fails
//! - update moves the blob first and moves it back if the row update fails
//! - delete removes the blob first, then the row
//!
//! When a compensating step fails too, the divergence is reported as
//! [`RegistryError::FatalInconsistency`] and logged at error level.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::datetime::{Clock, SystemClock};
use crate::error::{Inconsistency, InconsistencyKind};
use crate::{RegistryError, Result};

use super::lock::IdLocks;
use super::metadata::{FileRecord, FileUpdate, MetadataStore, NewFileRecord};
use super::path::{sanitize, split_file_name, validate_file_name};
use super::storage::BlobStore;
use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Requested changes for [`FileService::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    /// New base name. The extension is kept.
    pub name: Option<String>,
    /// Target directory, absolute or relative to the storage root.
    pub directory: Option<PathBuf>,
    /// `Some(None)` clears the comment.
    pub comment: Option<Option<String>>,
}

impl FileChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn comment(mut self, comment: Option<impl Into<String>>) -> Self {
        self.comment = Some(comment.map(|c| c.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.directory.is_none() && self.comment.is_none()
    }

    fn relocates(&self) -> bool {
        self.name.is_some() || self.directory.is_some()
    }
}

/// State of a record's blob on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStatus {
    Ok,
    Missing,
    SizeMismatch { expected: i64, actual: u64 },
}

impl BlobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobStatus::Ok => "ok",
            BlobStatus::Missing => "missing",
            BlobStatus::SizeMismatch { .. } => "size_mismatch",
        }
    }
}

/// A record whose blob is missing or damaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRecord {
    pub id: i64,
    pub path: String,
    pub status: BlobStatus,
}

/// Result of walking all records and all blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub records_checked: usize,
    pub dangling_records: Vec<DanglingRecord>,
    /// Blobs under the root that no record points at.
    pub orphan_blobs: Vec<PathBuf>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_records.is_empty() && self.orphan_blobs.is_empty()
    }
}

/// File service for uploading, relocating and deleting files.
pub struct FileService {
    root: PathBuf,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    locks: IdLocks,
}

impl FileService {
    /// Create a new FileService.
    ///
    /// `storage_root` must exist; it is canonicalized here.
    pub fn new(
        storage_root: impl AsRef<Path>,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let root = storage_root.as_ref().canonicalize()?;
        Ok(Self {
            root,
            blobs,
            records,
            clock: Arc::new(SystemClock),
            locks: IdLocks::new(),
        })
    }

    /// Use a different clock for timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Canonical storage root.
    pub fn storage_root(&self) -> &Path {
        &self.root
    }

    async fn sanitize(&self, raw: PathBuf) -> Result<PathBuf> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || sanitize(&raw, &root))
            .await
            .map_err(|e| std::io::Error::other(format!("spawn_blocking failed: {e}")))?
    }

    /// Store `content` under `suggested_name` and record it.
    ///
    /// The blob goes to `<root>/<suggested_name>`. An existing blob there is a
    /// `Conflict`; nothing is overwritten.
    #[instrument(skip(self, content, comment), fields(size = content.len()))]
    pub async fn create(
        &self,
        content: &[u8],
        suggested_name: &str,
        comment: Option<String>,
    ) -> Result<FileRecord> {
        validate_file_name(suggested_name)?;
        let (name, extension) = split_file_name(suggested_name);
        let path = self.sanitize(PathBuf::from(suggested_name.trim())).await?;

        let size = self.blobs.write(&path, content).await?;
        debug!(path = %path.display(), size, "Blob written");

        let mut new_record = NewFileRecord::new(
            name,
            extension,
            size as i64,
            path.to_string_lossy(),
            self.clock.now(),
        );
        if let Some(comment) = normalize_comment(comment) {
            new_record = new_record.with_comment(comment);
        }

        match self.records.insert(&new_record).await {
            Ok(record) => {
                info!(id = record.id, path = %record.path, "File created");
                Ok(record)
            }
            Err(e) => {
                match self.blobs.remove(&path).await {
                    Ok(()) => warn!(
                        path = %path.display(),
                        error = %e,
                        "Record insert failed; removed the new blob"
                    ),
                    Err(cleanup) => error!(
                        path = %path.display(),
                        error = %e,
                        cleanup_error = %cleanup,
                        "Record insert failed and the blob could not be removed; orphan blob left behind"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Get a record by id.
    pub async fn get(&self, id: i64) -> Result<FileRecord> {
        self.records.get_by_id(id).await
    }

    /// Get the first record with the given name.
    pub async fn get_by_name(&self, name: &str) -> Result<FileRecord> {
        self.records.get_by_name(name).await
    }

    /// Look a record up by numeric id, falling back to name.
    pub async fn resolve(&self, key: &str) -> Result<FileRecord> {
        if let Ok(id) = key.parse::<i64>() {
            match self.records.get_by_id(id).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        self.records.get_by_name(key).await
    }

    /// List records ordered by id.
    ///
    /// A missing limit means the default page size; limits are capped.
    pub async fn list(&self, offset: Option<i64>, limit: Option<i64>) -> Result<Vec<FileRecord>> {
        let offset = offset.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if offset < 0 || limit < 0 {
            return Err(RegistryError::Validation(
                "offset and limit must not be negative".to_string(),
            ));
        }
        self.records.list(offset, limit.min(MAX_PAGE_SIZE)).await
    }

    /// Total number of records.
    pub async fn count(&self) -> Result<i64> {
        self.records.count().await
    }

    /// Rename, relocate or re-comment a file.
    ///
    /// The blob is moved first. If the row update then fails, the move is
    /// reversed; if that fails as well the error is `FatalInconsistency`.
    #[instrument(skip(self))]
    pub async fn update(&self, id: i64, changes: FileChanges) -> Result<FileRecord> {
        let _guard = self.locks.lock(id).await;

        let existing = self.records.get_by_id(id).await?;
        if changes.is_empty() {
            return Ok(existing);
        }

        let mut update = FileUpdate::new();
        let old_path = PathBuf::from(&existing.path);
        let mut moved_to = None;

        if changes.relocates() {
            let name = match &changes.name {
                Some(name) => {
                    validate_file_name(name)?;
                    name.trim().to_string()
                }
                None => existing.name.clone(),
            };
            let directory = match &changes.directory {
                Some(dir) => dir.clone(),
                None => old_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            let target = self
                .sanitize(directory.join(format!("{name}{}", existing.extension)))
                .await?;

            if target != old_path {
                self.blobs.move_blob(&old_path, &target, false).await?;
                debug!(from = %old_path.display(), to = %target.display(), "Blob moved");
                update = update.path(target.to_string_lossy());
                moved_to = Some(target);
            }
            if changes.name.is_some() {
                update = update.name(name);
            }
        }

        if let Some(comment) = changes.comment {
            update = update.comment(normalize_comment(comment));
        }

        let result = self
            .records
            .update_fields(id, &update, self.clock.now())
            .await;

        match (result, moved_to) {
            (Ok(record), _) => {
                info!(id, path = %record.path, "File updated");
                Ok(record)
            }
            (Err(e), None) => Err(e),
            (Err(e), Some(target)) => match self.blobs.move_blob(&target, &old_path, false).await {
                Ok(()) => {
                    warn!(id, error = %e, "Record update failed; moved the blob back");
                    Err(e)
                }
                Err(revert) => {
                    let inconsistency = Inconsistency {
                        id,
                        kind: InconsistencyKind::MoveNotReverted,
                        recorded_path: old_path,
                        blob_path: Some(target),
                        cause: format!("{e}; move back failed: {revert}"),
                    };
                    error!(%inconsistency, "Blob and record diverged");
                    Err(RegistryError::FatalInconsistency(inconsistency))
                }
            },
        }
    }

    /// Delete a file's blob and then its record.
    ///
    /// A blob that is already gone does not stop the record from being
    /// deleted. Any other blob error aborts with nothing changed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let _guard = self.locks.lock(id).await;

        let existing = self.records.get_by_id(id).await?;
        let path = PathBuf::from(&existing.path);

        match self.blobs.remove(&path).await {
            Ok(()) => debug!(path = %path.display(), "Blob removed"),
            Err(e) if e.is_not_found() => {
                warn!(id, path = %path.display(), "Blob already gone; deleting record anyway")
            }
            Err(e) => return Err(e),
        }

        match self.records.delete(id).await {
            Ok(()) => {
                info!(id, "File deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                let inconsistency = Inconsistency {
                    id,
                    kind: InconsistencyKind::DanglingRecord,
                    recorded_path: path,
                    blob_path: None,
                    cause: e.to_string(),
                };
                error!(%inconsistency, "Blob and record diverged");
                Err(RegistryError::FatalInconsistency(inconsistency))
            }
        }
    }

    /// Read a file's content.
    pub async fn read_content(&self, id: i64) -> Result<(FileRecord, Vec<u8>)> {
        let record = self.records.get_by_id(id).await?;
        let content = self.blobs.read(Path::new(&record.path)).await?;
        Ok((record, content))
    }

    /// Check that a record's blob exists with the recorded size.
    pub async fn verify(&self, id: i64) -> Result<BlobStatus> {
        let record = self.records.get_by_id(id).await?;
        self.blob_status(&record).await
    }

    async fn blob_status(&self, record: &FileRecord) -> Result<BlobStatus> {
        match self.blobs.size(Path::new(&record.path)).await {
            Ok(actual) if actual as i64 == record.size => Ok(BlobStatus::Ok),
            Ok(actual) => Ok(BlobStatus::SizeMismatch {
                expected: record.size,
                actual,
            }),
            Err(e) if e.is_not_found() => Ok(BlobStatus::Missing),
            Err(e) => Err(e),
        }
    }

    /// Cross-check every record against the blobs on disk.
    pub async fn audit(&self) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        let mut known = HashSet::new();
        let mut offset = 0;

        loop {
            let page = self.records.list(offset, MAX_PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            for record in page {
                report.records_checked += 1;
                let status = self.blob_status(&record).await?;
                if status != BlobStatus::Ok {
                    report.dangling_records.push(DanglingRecord {
                        id: record.id,
                        path: record.path.clone(),
                        status,
                    });
                }
                known.insert(PathBuf::from(record.path));
            }
        }

        report.orphan_blobs = self
            .blobs
            .list()
            .await?
            .into_iter()
            .filter(|blob| !known.contains(blob))
            .collect();

        if report.is_clean() {
            info!(records = report.records_checked, "Audit clean");
        } else {
            warn!(
                records = report.records_checked,
                dangling = report.dangling_records.len(),
                orphans = report.orphan_blobs.len(),
                "Audit found inconsistencies"
            );
        }
        Ok(report)
    }
}

/// Blank comments are stored as no comment.
fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.filter(|c| !c.trim().is_empty())
}
