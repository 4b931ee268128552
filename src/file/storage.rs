//! Blob storage.
//!
//! [`BlobStore`] is the durability layer for file bytes. [`FileStorage`] is
//! the local filesystem implementation:
//! - writes go to a temp file in the target directory, are fsynced, then
//!   linked into place without clobbering anything already there
//! - moves that must not clobber claim the target with a hard link and then
//!   unlink the source; overwriting moves are a single `rename`
//! - across volumes moves fall back to copy + fsync + remove, which is NOT
//!   atomic (a crash in between can leave both copies)
//! - removing a blob that is already gone reports `NotFound`
//!
//! Paths handed to these methods are expected to be sanitized already.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::{RegistryError, Result};

/// Prefix for in-flight temp files. Skipped when listing blobs.
const TEMP_PREFIX: &str = ".tmp.";

/// Tries at placing a blob when its target directory keeps being pruned.
const PARENT_ATTEMPTS: usize = 3;

/// Filesystem primitives the consistency coordinator builds on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `content` to `path`, creating parent directories.
    ///
    /// Either the whole blob becomes visible or none of it does. Fails with
    /// `Conflict` if something already exists at `path`. Returns the byte size.
    async fn write(&self, path: &Path, content: &[u8]) -> Result<u64>;

    /// Move a blob from `from` to `to`.
    ///
    /// Fails with `NotFound` if `from` is missing and with `Conflict` if `to`
    /// is occupied and `overwrite` is false.
    async fn move_blob(&self, from: &Path, to: &Path, overwrite: bool) -> Result<()>;

    /// Delete a blob. A blob that is already gone is `NotFound`, not success.
    async fn remove(&self, path: &Path) -> Result<()>;

    /// Whether something exists at `path`.
    ///
    /// Diagnostics only; control flow never depends on it.
    async fn exists(&self, path: &Path) -> bool;

    /// Read a blob's bytes.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Size of a blob in bytes.
    async fn size(&self, path: &Path) -> Result<u64>;

    /// Every blob currently under the storage root.
    async fn list(&self) -> Result<Vec<PathBuf>>;
}

/// Local filesystem blob store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Canonical storage root.
    root: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with the given root.
    ///
    /// The root directory is created if it doesn't exist and stored in
    /// canonical form.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;

        Ok(Self { root })
    }

    /// Get the canonical root of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove empty directories from `dir` upwards, stopping at the root.
    ///
    /// Best effort: the first non-empty or unremovable directory ends the walk.
    async fn prune_empty_dirs(&self, dir: Option<&Path>) {
        let mut current = dir;
        while let Some(d) = current {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            debug!(dir = %d.display(), "Removed empty directory");
            current = d.parent();
        }
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Put the blob at `from` in place at `to`.
    ///
    /// Without `overwrite` the target is claimed with a hard link, which fails
    /// atomically if the name is taken, and the source name is unlinked after.
    /// A target directory pruned by a concurrent removal is recreated.
    async fn place(&self, from: &Path, to: &Path, overwrite: bool) -> Result<()> {
        let mut attempt = 1;
        loop {
            Self::ensure_parent(to).await?;

            let result = if overwrite {
                fs::rename(from, to).await
            } else {
                fs::hard_link(from, to).await
            };

            match result {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(RegistryError::Conflict(format!(
                        "{} already exists",
                        to.display()
                    )));
                }
                Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                    return self.move_across_volumes(from, to, overwrite).await;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    fs::symlink_metadata(from)
                        .await
                        .map_err(|e| not_found_or_io(from, e))?;
                    if attempt >= PARENT_ATTEMPTS {
                        return Err(RegistryError::Io(e));
                    }
                    debug!(
                        attempt,
                        to = %to.display(),
                        "Target directory vanished, retrying move"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(RegistryError::Io(e)),
            }
        }

        if !overwrite {
            if let Err(e) = fs::remove_file(from).await {
                if let Err(undo) = fs::remove_file(to).await {
                    warn!(
                        to = %to.display(),
                        error = %undo,
                        "Failed to drop new link after move failed"
                    );
                }
                return Err(not_found_or_io(from, e));
            }
        }
        Ok(())
    }

    /// Copy + fsync + remove, for moves that cross a volume boundary.
    async fn move_across_volumes(&self, from: &Path, to: &Path, overwrite: bool) -> Result<()> {
        warn!(
            from = %from.display(),
            to = %to.display(),
            "Cross-volume move: falling back to non-atomic copy"
        );

        let from_owned = from.to_path_buf();
        let to_owned = to.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = to_owned.parent().unwrap_or_else(|| Path::new("."));
            let mut temp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(parent)?;
            let mut source = std::fs::File::open(&from_owned)?;
            let expected = source.metadata()?.len();
            let copied = io::copy(&mut source, temp.as_file_mut())?;
            if copied != expected {
                return Err(RegistryError::Io(io::Error::other(format!(
                    "short copy of {}: {copied} of {expected} bytes",
                    from_owned.display()
                ))));
            }
            temp.as_file().sync_all()?;
            persist(temp, &to_owned, overwrite)
        })
        .await
        .map_err(|e| io::Error::other(format!("spawn_blocking failed: {e}")))??;

        fs::remove_file(from).await?;
        Ok(())
    }
}

/// Move a finished temp file into place.
fn persist(temp: tempfile::NamedTempFile, path: &Path, overwrite: bool) -> Result<()> {
    let result = if overwrite {
        temp.persist(path).map(|_| ())
    } else {
        temp.persist_noclobber(path).map(|_| ())
    };

    result.map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            RegistryError::Conflict(format!("{} already exists", path.display()))
        } else {
            RegistryError::Io(e.error)
        }
    })
}

fn not_found_or_io(path: &Path, e: io::Error) -> RegistryError {
    if e.kind() == io::ErrorKind::NotFound {
        RegistryError::NotFound(format!("blob {}", path.display()))
    } else {
        RegistryError::Io(e)
    }
}

fn is_not_found(err: &RegistryError) -> bool {
    matches!(err, RegistryError::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

#[async_trait]
impl BlobStore for FileStorage {
    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn write(&self, path: &Path, content: &[u8]) -> Result<u64> {
        let content: Arc<[u8]> = Arc::from(content);
        let mut attempt = 1;

        let result = loop {
            if let Err(e) = Self::ensure_parent(path).await {
                break Err(e);
            }

            let path = path.to_path_buf();
            let content = Arc::clone(&content);
            let result = tokio::task::spawn_blocking(move || -> Result<u64> {
                let parent = path.parent().unwrap_or_else(|| Path::new("."));
                let mut temp = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .tempfile_in(parent)?;
                temp.write_all(&content)?;
                temp.as_file().sync_all()?;
                persist(temp, &path, false)?;
                Ok(content.len() as u64)
            })
            .await
            .map_err(|e| io::Error::other(format!("spawn_blocking failed: {e}")))?;

            match result {
                // The parent was pruned by a concurrent removal.
                Err(ref e) if is_not_found(e) && attempt < PARENT_ATTEMPTS => {
                    debug!(attempt, "Target directory vanished, retrying write");
                    attempt += 1;
                }
                other => break other,
            }
        };

        if result.is_err() {
            self.prune_empty_dirs(path.parent()).await;
        }
        result
    }

    #[instrument(skip(self))]
    async fn move_blob(&self, from: &Path, to: &Path, overwrite: bool) -> Result<()> {
        fs::symlink_metadata(from)
            .await
            .map_err(|e| not_found_or_io(from, e))?;

        if from == to {
            return Ok(());
        }

        let result = self.place(from, to, overwrite).await;
        match result {
            Ok(()) => self.prune_empty_dirs(from.parent()).await,
            Err(_) => self.prune_empty_dirs(to.parent()).await,
        }
        result
    }

    #[instrument(skip(self))]
    async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| not_found_or_io(path, e))?;
        self.prune_empty_dirs(path.parent()).await;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| not_found_or_io(path, e))
    }

    async fn size(&self, path: &Path) -> Result<u64> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| not_found_or_io(path, e))?;
        Ok(meta.len())
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut blobs = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    blobs.push(path);
                }
            }
        }

        blobs.sort();
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("blobs")).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("storage");
        assert!(!root.exists());

        let storage = FileStorage::new(&root).unwrap();

        assert!(root.exists());
        assert_eq!(storage.root(), root.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("hello.txt");

        let size = storage.write(&path, b"Hello, World!").await.unwrap();

        assert_eq!(size, 13);
        assert_eq!(storage.read(&path).await.unwrap(), b"Hello, World!");
        assert_eq!(storage.size(&path).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("a").join("b").join("deep.bin");

        storage.write(&path, &[1, 2, 3]).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_does_not_clobber() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("taken.txt");
        storage.write(&path, b"first").await.unwrap();

        let result = storage.write(&path, b"second").await;

        assert!(matches!(result, Err(RegistryError::Conflict(_))));
        assert_eq!(storage.read(&path).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("clean.txt");
        storage.write(&path, b"data").await.unwrap();
        let _ = storage.write(&path, b"again").await;

        let names: Vec<_> = std::fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clean.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_binary_content() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("binary.bin");
        let content: Vec<u8> = (0..=255).collect();

        storage.write(&path, &content).await.unwrap();

        assert_eq!(storage.read(&path).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_move_blob() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("old.txt");
        let to = storage.root().join("nested").join("new.txt");
        storage.write(&from, b"moving").await.unwrap();

        storage.move_blob(&from, &to, false).await.unwrap();

        assert!(!storage.exists(&from).await);
        assert_eq!(storage.read(&to).await.unwrap(), b"moving");
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("ghost.txt");
        let to = storage.root().join("dest.txt");

        let result = storage.move_blob(&from, &to, false).await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        assert!(!storage.exists(&to).await);
    }

    #[tokio::test]
    async fn test_move_conflict_without_overwrite() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("a.txt");
        let to = storage.root().join("b.txt");
        storage.write(&from, b"a").await.unwrap();
        storage.write(&to, b"b").await.unwrap();

        let result = storage.move_blob(&from, &to, false).await;

        assert!(matches!(result, Err(RegistryError::Conflict(_))));
        assert_eq!(storage.read(&from).await.unwrap(), b"a");
        assert_eq!(storage.read(&to).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_move_with_overwrite() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("a.txt");
        let to = storage.root().join("b.txt");
        storage.write(&from, b"a").await.unwrap();
        storage.write(&to, b"b").await.unwrap();

        storage.move_blob(&from, &to, true).await.unwrap();

        assert!(!storage.exists(&from).await);
        assert_eq!(storage.read(&to).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_move_prunes_empty_source_directory() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("sub").join("f.txt");
        let to = storage.root().join("f.txt");
        storage.write(&from, b"x").await.unwrap();

        storage.move_blob(&from, &to, false).await.unwrap();

        assert!(!storage.root().join("sub").exists());
        assert!(storage.root().exists());
    }

    #[tokio::test]
    async fn test_remove_twice_is_not_found() {
        let (_tmp, storage) = setup_storage();
        let path = storage.root().join("once.txt");
        storage.write(&path, b"bye").await.unwrap();

        storage.remove(&path).await.unwrap();
        let second = storage.remove(&path).await;

        assert!(matches!(second, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let (_tmp, storage) = setup_storage();
        let result = storage.read(&storage.root().join("nope")).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_skips_temp_files() {
        let (_tmp, storage) = setup_storage();
        storage.write(&storage.root().join("a.txt"), b"a").await.unwrap();
        storage
            .write(&storage.root().join("d").join("b.txt"), b"b")
            .await
            .unwrap();
        std::fs::write(storage.root().join(".tmp.leftover"), b"partial").unwrap();

        let blobs = storage.list().await.unwrap();

        assert_eq!(
            blobs,
            vec![
                storage.root().join("a.txt"),
                storage.root().join("d").join("b.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_prunes_created_directories() {
        let (_tmp, storage) = setup_storage();
        let path = storage
            .root()
            .join("fresh")
            .join("dirs")
            .join("x".repeat(300));

        let result = storage.write(&path, b"data").await;

        assert!(matches!(result, Err(RegistryError::Io(_))));
        assert!(!storage.root().join("fresh").exists());
        assert!(storage.root().exists());
    }

    #[tokio::test]
    async fn test_move_conflict_leaves_both_blobs() {
        let (_tmp, storage) = setup_storage();
        let from = storage.root().join("a.txt");
        let to = storage.root().join("sub").join("b.txt");
        storage.write(&from, b"a").await.unwrap();
        storage.write(&to, b"b").await.unwrap();

        let result = storage.move_blob(&from, &to, false).await;

        assert!(matches!(result, Err(RegistryError::Conflict(_))));
        assert_eq!(storage.list().await.unwrap(), vec![from, to]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_move_and_write_racing_for_one_path() {
        let (_tmp, storage) = setup_storage();

        for i in 0..200 {
            let from = storage.root().join(format!("from{i}.txt"));
            let to = storage.root().join(format!("to{i}.txt"));
            storage.write(&from, b"moved").await.unwrap();

            let mover = storage.clone();
            let (m_from, m_to) = (from.clone(), to.clone());
            let moving =
                tokio::spawn(async move { mover.move_blob(&m_from, &m_to, false).await });
            let writer = storage.clone();
            let w_to = to.clone();
            let writing = tokio::spawn(async move { writer.write(&w_to, b"written").await });

            let moved = moving.await.unwrap();
            let written = writing.await.unwrap();

            match (moved, written) {
                (Ok(()), Err(RegistryError::Conflict(_))) => {
                    assert_eq!(storage.read(&to).await.unwrap(), b"moved");
                    assert!(!storage.exists(&from).await);
                }
                (Err(RegistryError::Conflict(_)), Ok(_)) => {
                    assert_eq!(storage.read(&to).await.unwrap(), b"written");
                    assert_eq!(storage.read(&from).await.unwrap(), b"moved");
                }
                other => panic!("iteration {i}: expected exactly one winner, got {other:?}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_move_into_directory_being_pruned() {
        let (_tmp, storage) = setup_storage();

        for i in 0..200 {
            let dir = storage.root().join(format!("sub{i}"));
            let from = storage.root().join(format!("a{i}.txt"));
            let to = dir.join(format!("a{i}.txt"));
            let last = dir.join(format!("b{i}.txt"));
            storage.write(&from, b"a").await.unwrap();
            storage.write(&last, b"b").await.unwrap();

            let mover = storage.clone();
            let (m_from, m_to) = (from.clone(), to.clone());
            let moving =
                tokio::spawn(async move { mover.move_blob(&m_from, &m_to, false).await });
            let remover = storage.clone();
            let removing = tokio::spawn(async move { remover.remove(&last).await });

            moving
                .await
                .unwrap()
                .unwrap_or_else(|e| panic!("iteration {i}: {e}"));
            removing.await.unwrap().unwrap();
            assert_eq!(storage.read(&to).await.unwrap(), b"a");
            assert!(!storage.exists(&from).await);
        }
    }
}
