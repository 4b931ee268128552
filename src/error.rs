//! Error types for the file registry.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which of the two unrecoverable divergences was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistencyKind {
    /// A blob was moved, the metadata update failed, and moving it back failed too.
    MoveNotReverted,
    /// The blob was removed but its record could not be deleted.
    DanglingRecord,
}

impl InconsistencyKind {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistencyKind::MoveNotReverted => "move_not_reverted",
            InconsistencyKind::DanglingRecord => "dangling_record",
        }
    }
}

/// Details of a blob/record divergence that needs manual repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    /// Record id involved.
    pub id: i64,
    /// Kind of divergence.
    pub kind: InconsistencyKind,
    /// Path the metadata row still points at.
    pub recorded_path: PathBuf,
    /// Where the blob actually is, if it still exists.
    pub blob_path: Option<PathBuf>,
    /// The error that caused the divergence.
    pub cause: String,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for file {}: record points at {}",
            self.kind.as_str(),
            self.id,
            self.recorded_path.display()
        )?;
        match &self.blob_path {
            Some(blob) => write!(f, ", blob is at {}", blob.display())?,
            None => write!(f, ", blob is gone")?,
        }
        write!(f, " ({})", self.cause)
    }
}

/// Common error type for the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// File name is empty or contains a path separator.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Target path resolves outside the storage root.
    #[error("unsafe path: {0}")]
    UnsafePath(String),

    /// Record or blob not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Something already exists at the target path.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Blob and record diverged and could not be brought back together.
    #[error("fatal inconsistency: {0}")]
    FatalInconsistency(Inconsistency),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        RegistryError::Persistence(e.to_string())
    }
}

impl RegistryError {
    /// True if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
