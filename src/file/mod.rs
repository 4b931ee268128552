//! File registry core.
//!
//! This module provides:
//! - Path sanitizing against the storage root
//! - Blob storage on the local filesystem
//! - File metadata records in SQLite
//! - The service that keeps blobs and records consistent

mod lock;
mod metadata;
mod path;
mod service;
mod storage;

pub use lock::{IdGuard, IdLocks};
pub use metadata::{FileRecord, FileRepository, FileUpdate, MetadataStore, NewFileRecord};
pub use path::{sanitize, split_file_name, validate_file_name, MAX_NAME_LENGTH};
pub use service::{AuditReport, BlobStatus, DanglingRecord, FileChanges, FileService};
pub use storage::{BlobStore, FileStorage};

/// Maximum length for a comment (in characters).
pub const MAX_COMMENT_LENGTH: usize = 2000;

/// Maximum length for a requested directory path (in characters).
pub const MAX_PATH_LENGTH: usize = 1024;

/// Records returned by a list call when no limit is given.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Upper bound on the limit of a list call.
pub const MAX_PAGE_SIZE: i64 = 1000;
