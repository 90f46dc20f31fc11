//! Schema migrations.
//!
//! Applied versions are tracked in `_migrations`; each migration runs at
//! most once, so `run_all` is safe on every startup.

use rusqlite::Connection;
use tracing::info;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_documents_table",
        sql: "CREATE TABLE documents (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                filename          TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_path         TEXT NOT NULL,
                file_size         INTEGER NOT NULL,
                status            TEXT NOT NULL DEFAULT 'uploaded',
                error_message     TEXT,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
              );
              CREATE INDEX idx_documents_filename ON documents (filename);",
    },
    Migration {
        version: 2,
        description: "create_processing_jobs_table",
        sql: "CREATE TABLE processing_jobs (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id      INTEGER NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
                status           TEXT NOT NULL DEFAULT 'pending',
                output_path      TEXT,
                markdown_content TEXT,
                error_message    TEXT,
                attempts         INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL,
                completed_at     TEXT
              );
              CREATE INDEX idx_processing_jobs_document_id ON processing_jobs (document_id);",
    },
];

/// Applies every migration newer than the recorded version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            "Running migration v{}: {}",
            migration.version, migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
