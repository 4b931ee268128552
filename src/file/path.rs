//! Storage path validation.
//!
//! Every blob location handed to the storage layer goes through [`sanitize`],
//! which resolves it against the storage root and refuses anything whose
//! canonical form lands outside that root.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::{RegistryError, Result};

/// Maximum length of a file name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Resolve `raw` to a safe absolute path under `storage_root`.
///
/// Relative paths are taken relative to the root. Both the root and the
/// candidate are canonicalized (symlinks and `..` resolved); for a candidate
/// that does not exist yet, the nearest existing ancestor is canonicalized and
/// the remaining components are appended. The result must be nested under the
/// canonical root.
///
/// Pure validation: nothing is created or modified.
pub fn sanitize(raw: &Path, storage_root: &Path) -> Result<PathBuf> {
    check_base_name(raw)?;

    let root = storage_root.canonicalize().map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to canonicalize storage root {}: {e}", storage_root.display()),
        )
    })?;

    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        storage_root.join(raw)
    };

    let resolved = resolve(&candidate)?;

    if resolved == root || !resolved.starts_with(&root) {
        return Err(RegistryError::UnsafePath(format!(
            "{} resolves outside the storage root",
            raw.display()
        )));
    }

    Ok(resolved)
}

/// Canonicalize a path that may not exist yet.
fn resolve(candidate: &Path) -> Result<PathBuf> {
    let mut existing = candidate;
    let mut pending: Vec<Component<'_>> = Vec::new();

    loop {
        match std::fs::symlink_metadata(existing) {
            Ok(meta) => {
                let canonical = existing.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        RegistryError::UnsafePath(format!(
                            "symlink target missing or invalid: {}",
                            existing.display()
                        ))
                    } else {
                        RegistryError::Io(e)
                    }
                })?;
                return append_lexically(canonical, pending.into_iter().rev());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RegistryError::Io(e)),
        }

        let (Some(parent), Some(last)) = (existing.parent(), existing.components().next_back())
        else {
            return Err(RegistryError::UnsafePath(format!(
                "no existing ancestor for {}",
                candidate.display()
            )));
        };
        pending.push(last);
        existing = parent;
    }
}

fn append_lexically<'a>(
    mut base: PathBuf,
    rest: impl Iterator<Item = Component<'a>>,
) -> Result<PathBuf> {
    for component in rest {
        match component {
            Component::Normal(part) => base.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !base.pop() {
                    return Err(RegistryError::UnsafePath(
                        "path climbs above the filesystem root".to_string(),
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RegistryError::UnsafePath(
                    "unexpected root component".to_string(),
                ));
            }
        }
    }
    Ok(base)
}

fn check_base_name(raw: &Path) -> Result<()> {
    let raw_str = raw.to_string_lossy();
    if raw_str.ends_with('/') || raw_str.ends_with('\\') {
        return Err(RegistryError::InvalidName(format!(
            "{raw_str} has no file name"
        )));
    }

    let name = raw
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RegistryError::InvalidName(format!("{raw_str} has no file name")))?;

    validate_file_name(&name)
}

/// Validate a single file name (base name plus optional extension).
pub fn validate_file_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidName("name is empty".to_string()));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(RegistryError::InvalidName(format!("{trimmed} is not a file name")));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(RegistryError::InvalidName(format!(
            "{trimmed} contains a path separator"
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(RegistryError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(RegistryError::InvalidName(format!(
            "name is longer than {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Split an uploaded file name into `(name, extension)`.
///
/// The extension keeps its leading dot and is empty when there is none.
/// Leading-dot names such as `.env` have no extension.
pub fn split_file_name(file_name: &str) -> (String, String) {
    let trimmed = file_name.trim();
    match trimmed.rfind('.') {
        Some(idx) if idx > 0 => (trimmed[..idx].to_string(), trimmed[idx..].to_string()),
        _ => (trimmed.to_string(), String::new()),
    }
}
