//! Database schema and migrations.
//!
//! Migrations are applied in order when the database is opened. The
//! `schema_version` table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: file records
    r#"
CREATE TABLE files (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,  -- AUTOINCREMENT: ids are never reused
    name        TEXT NOT NULL,
    extension   TEXT NOT NULL DEFAULT '',
    size        INTEGER NOT NULL,
    path        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT,
    comment     TEXT
);

CREATE INDEX idx_files_name ON files(name);
"#,
    // v2: lookups by path during audits
    r#"
CREATE INDEX idx_files_path ON files(path);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_creates_files_table() {
        let first = MIGRATIONS[0];
        assert!(first.contains("CREATE TABLE files"));
        assert!(first.contains("AUTOINCREMENT"));
        assert!(first.contains("updated_at"));
    }
}
