//! API handlers.

pub mod files;
pub mod maintenance;

pub use files::*;
pub use maintenance::*;

use std::sync::Arc;

use crate::file::FileService;

/// Shared application state.
pub struct AppState {
    /// File service.
    pub files: Arc<FileService>,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(files: Arc<FileService>, max_upload_size: u64) -> Self {
        Self {
            files,
            max_upload_size,
        }
    }
}
