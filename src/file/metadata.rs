//! File records and the metadata repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool};

use crate::{RegistryError, Result};

/// Metadata for one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique, never reused.
    pub id: i64,
    /// Base name without extension.
    pub name: String,
    /// Extension with its leading dot, or empty.
    pub extension: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Absolute canonical path of the blob.
    pub path: String,
    pub created_at: DateTime<Utc>,
    /// Set by every successful mutation after creation.
    pub updated_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl FileRecord {
    /// Name with extension, as it appears on disk.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

/// Data for inserting a new record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub comment: Option<String>,
}

impl NewFileRecord {
    /// Create a new NewFileRecord.
    pub fn new(
        name: impl Into<String>,
        extension: impl Into<String>,
        size: i64,
        path: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            size,
            path: path.into(),
            created_at,
            comment: None,
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Partial update of a record's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub path: Option<String>,
    /// `Some(None)` clears the comment.
    pub comment: Option<Option<String>>,
}

impl FileUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a new blob path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set or clear the comment.
    pub fn comment(mut self, comment: Option<impl Into<String>>) -> Self {
        self.comment = Some(comment.map(|c| c.into()));
        self
    }

    /// Check if the update is empty.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.path.is_none() && self.comment.is_none()
    }
}

/// Durable metadata rows, one per blob.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record and return it with its assigned id.
    async fn insert(&self, record: &NewFileRecord) -> Result<FileRecord>;

    async fn get_by_id(&self, id: i64) -> Result<FileRecord>;

    /// First record (lowest id) with the given name.
    async fn get_by_name(&self, name: &str) -> Result<FileRecord>;

    /// Records ordered by id.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<FileRecord>>;

    async fn count(&self) -> Result<i64>;

    /// Apply `update` and stamp `updated_at` with `now`.
    async fn update_fields(
        &self,
        id: i64,
        update: &FileUpdate,
        now: DateTime<Utc>,
    ) -> Result<FileRecord>;

    async fn delete(&self, id: i64) -> Result<()>;
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, extension, size, path, created_at, updated_at, comment FROM files";

/// SQLite-backed metadata store.
#[derive(Debug, Clone)]
pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    /// Create a new FileRepository over the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn not_found(id: i64) -> RegistryError {
        RegistryError::NotFound(format!("file {id}"))
    }
}

#[async_trait]
impl MetadataStore for FileRepository {
    async fn insert(&self, record: &NewFileRecord) -> Result<FileRecord> {
        let result = sqlx::query(
            "INSERT INTO files (name, extension, size, path, created_at, comment)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.name)
        .bind(&record.extension)
        .bind(record.size)
        .bind(&record.path)
        .bind(record.created_at)
        .bind(&record.comment)
        .execute(&self.pool)
        .await?;

        self.get_by_id(result.last_insert_rowid()).await
    }

    async fn get_by_id(&self, id: i64) -> Result<FileRecord> {
        sqlx::query_as::<_, FileRecord>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn get_by_name(&self, name: &str) -> Result<FileRecord> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "{SELECT_COLUMNS} WHERE name = ? ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("file named {name:?}")))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(&format!(
            "{SELECT_COLUMNS} ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn update_fields(
        &self,
        id: i64,
        update: &FileUpdate,
        now: DateTime<Utc>,
    ) -> Result<FileRecord> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }

        if let Some(ref path) = update.path {
            separated.push("path = ");
            separated.push_bind_unseparated(path.clone());
        }

        if let Some(ref comment) = update.comment {
            separated.push("comment = ");
            separated.push_bind_unseparated(comment.clone());
        }

        separated.push("updated_at = ");
        separated.push_bind_unseparated(now);

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }

        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::{Duration, TimeZone};

    async fn setup() -> (Database, FileRepository) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = FileRepository::new(db.pool().clone());
        (db, repo)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn new_record(name: &str) -> NewFileRecord {
        NewFileRecord::new(name, ".txt", 5, format!("/srv/files/{name}.txt"), at(9))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_db, repo) = setup().await;

        let record = repo
            .insert(&new_record("notes").with_comment("first draft"))
            .await
            .unwrap();

        assert!(record.id > 0);
        assert_eq!(record.name, "notes");
        assert_eq!(record.extension, ".txt");
        assert_eq!(record.size, 5);
        assert_eq!(record.path, "/srv/files/notes.txt");
        assert_eq!(record.created_at, at(9));
        assert!(record.updated_at.is_none());
        assert_eq!(record.comment.as_deref(), Some("first draft"));
        assert_eq!(record.file_name(), "notes.txt");

        assert_eq!(repo.get_by_id(record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let (_db, repo) = setup().await;
        let result = repo.get_by_id(999).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_by_name_returns_lowest_id() {
        let (_db, repo) = setup().await;
        let first = repo.insert(&new_record("dup")).await.unwrap();
        let mut second = new_record("dup");
        second.path = "/srv/files/other/dup.txt".to_string();
        repo.insert(&second).await.unwrap();

        let found = repo.get_by_name("dup").await.unwrap();
        assert_eq!(found.id, first.id);

        let missing = repo.get_by_name("nope").await;
        assert!(matches!(missing, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_with_offset_and_limit() {
        let (_db, repo) = setup().await;
        for name in ["a", "b", "c", "d"] {
            repo.insert(&new_record(name)).await.unwrap();
        }

        let page = repo.list(1, 2).await.unwrap();
        let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        assert_eq!(repo.list(0, 100).await.unwrap().len(), 4);
        assert!(repo.list(10, 5).await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_update_fields() {
        let (_db, repo) = setup().await;
        let record = repo
            .insert(&new_record("old").with_comment("keep me"))
            .await
            .unwrap();

        let update = FileUpdate::new().name("new").path("/srv/files/new.txt");
        let updated = repo.update_fields(record.id, &update, at(10)).await.unwrap();

        assert_eq!(updated.name, "new");
        assert_eq!(updated.path, "/srv/files/new.txt");
        assert_eq!(updated.comment.as_deref(), Some("keep me"));
        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.updated_at, Some(at(10)));
    }

    #[tokio::test]
    async fn test_update_clears_comment() {
        let (_db, repo) = setup().await;
        let record = repo
            .insert(&new_record("c").with_comment("remove"))
            .await
            .unwrap();

        let update = FileUpdate::new().comment(None::<String>);
        let updated = repo
            .update_fields(record.id, &update, at(9) + Duration::minutes(1))
            .await
            .unwrap();

        assert!(updated.comment.is_none());
        assert_eq!(updated.name, "c");
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let (_db, repo) = setup().await;
        let result = repo
            .update_fields(42, &FileUpdate::new().name("x"), at(10))
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_db, repo) = setup().await;
        let record = repo.insert(&new_record("gone")).await.unwrap();

        repo.delete(record.id).await.unwrap();

        assert!(repo.get_by_id(record.id).await.unwrap_err().is_not_found());
        assert!(repo.delete(record.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_ids_not_reused() {
        let (_db, repo) = setup().await;
        let first = repo.insert(&new_record("one")).await.unwrap();
        repo.delete(first.id).await.unwrap();

        let second = repo.insert(&new_record("two")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_file_update_builder() {
        assert!(FileUpdate::new().is_empty());
        assert!(!FileUpdate::new().name("x").is_empty());
        assert!(!FileUpdate::new().comment(None::<String>).is_empty());
        assert_eq!(
            FileUpdate::new().comment(Some("hi")).comment,
            Some(Some("hi".to_string()))
        );
    }
}
