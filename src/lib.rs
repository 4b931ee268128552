//! filereg - file metadata registry
//!
//! Stores uploaded files on the local filesystem and keeps a SQLite record
//! for each one, with the two kept consistent across create, update and
//! delete.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{Inconsistency, InconsistencyKind, RegistryError, Result};
pub use file::{FileChanges, FileRecord, FileService};
