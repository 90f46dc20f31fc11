//! Job repository: CRUD over the `processing_jobs` table.
//!
//! The status-changing writes (`mark_*`) also set or clear the success
//! fields in the same statement, so a row never carries output data unless
//! it is COMPLETED.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::model::{JobStatus, ProcessingJob};

fn from_row(row: &Row<'_>) -> Result<ProcessingJob, rusqlite::Error> {
    Ok(ProcessingJob {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        status: row.get("status")?,
        output_path: row
            .get::<_, Option<String>>("output_path")?
            .map(PathBuf::from),
        markdown_content: row.get("markdown_content")?,
        error_message: row.get("error_message")?,
        attempts: row.get("attempts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

fn expect_one(changed: usize, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::RowNotFound {
            table: "processing_jobs",
            id,
        });
    }
    Ok(())
}

/// Creates a PENDING job for `document_id` with zero attempts.
pub fn insert_pending(db: &Database, document_id: i64) -> Result<ProcessingJob, DatabaseError> {
    db.with_conn(|conn| {
        let now = Utc::now();
        conn.execute(
            "INSERT INTO processing_jobs (document_id, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![document_id, JobStatus::Pending, now],
        )?;
        Ok(ProcessingJob {
            id: conn.last_insert_rowid(),
            document_id,
            status: JobStatus::Pending,
            output_path: None,
            markdown_content: None,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ProcessingJob>, DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row(
                "SELECT * FROM processing_jobs WHERE id = ?1",
                params![id],
                from_row,
            )
            .optional()?;
        Ok(job)
    })
}

/// All jobs of a document, newest first.
pub fn list_for_document(
    db: &Database,
    document_id: i64,
) -> Result<Vec<ProcessingJob>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM processing_jobs WHERE document_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![document_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// PROCESSING, one more attempt, no error, no success fields.
pub fn mark_processing(db: &Database, id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs
             SET status = ?2, attempts = attempts + 1, error_message = NULL,
                 output_path = NULL, markdown_content = NULL, completed_at = NULL,
                 updated_at = ?3
             WHERE id = ?1",
            params![id, JobStatus::Processing, Utc::now()],
        )?;
        expect_one(changed, id)
    })
}

/// COMPLETED with output path, full markdown and completion time.
pub fn mark_completed(
    db: &Database,
    id: i64,
    output_path: &Path,
    markdown: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE processing_jobs
             SET status = ?2, output_path = ?3, markdown_content = ?4, error_message = NULL,
                 completed_at = ?5, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                JobStatus::Completed,
                output_path.to_string_lossy(),
                markdown,
                now
            ],
        )?;
        expect_one(changed, id)
    })
}

/// FAILED with `error`; success fields cleared.
pub fn mark_failed(db: &Database, id: i64, error: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs
             SET status = ?2, error_message = ?3,
                 output_path = NULL, markdown_content = NULL, completed_at = NULL,
                 updated_at = ?4
             WHERE id = ?1",
            params![id, JobStatus::Failed, error, Utc::now()],
        )?;
        expect_one(changed, id)
    })
}
