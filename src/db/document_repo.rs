//! Document repository: CRUD over the `documents` table.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::model::{Document, DocumentStatus};

/// Fields known at upload time; the rest are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub original_filename: String,
    pub file_path: PathBuf,
    pub file_size: i64,
}

fn from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    Ok(Document {
        id: row.get("id")?,
        filename: row.get("filename")?,
        original_filename: row.get("original_filename")?,
        file_path: PathBuf::from(row.get::<_, String>("file_path")?),
        file_size: row.get("file_size")?,
        status: row.get("status")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Inserts a document in UPLOADED state and returns the stored row.
pub fn insert(db: &Database, doc: &NewDocument) -> Result<Document, DatabaseError> {
    db.with_conn(|conn| {
        let now = Utc::now();
        conn.execute(
            "INSERT INTO documents (filename, original_filename, file_path, file_size,
             status, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
            params![
                doc.filename,
                doc.original_filename,
                doc.file_path.to_string_lossy(),
                doc.file_size,
                DocumentStatus::Uploaded,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Document {
            id,
            filename: doc.filename.clone(),
            original_filename: doc.original_filename.clone(),
            file_path: doc.file_path.clone(),
            file_size: doc.file_size,
            status: DocumentStatus::Uploaded,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let doc = conn
            .query_row("SELECT * FROM documents WHERE id = ?1", params![id], from_row)
            .optional()?;
        Ok(doc)
    })
}

/// Documents in id order, paginated.
pub fn list(db: &Database, skip: u32, limit: u32) -> Result<Vec<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM documents ORDER BY id ASC LIMIT ?1 OFFSET ?2")?;
        let rows = stmt
            .query_map(params![limit, skip], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Sets status and error message in one statement. `error = None` clears it.
pub fn set_status(
    db: &Database,
    id: i64,
    status: DocumentStatus,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status, error, Utc::now()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::RowNotFound {
                table: "documents",
                id,
            });
        }
        Ok(())
    })
}

/// Deletes the row (jobs cascade). Returns `false` if it did not exist.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(name: &str) -> NewDocument {
        NewDocument {
            filename: format!("{name}-uuid.pdf"),
            original_filename: format!("{name}.pdf"),
            file_path: PathBuf::from(format!("uploads/{name}-uuid.pdf")),
            file_size: 1000,
        }
    }

    #[test]
    fn insert_and_find() {
        let db = test_db();
        let doc = insert(&db, &sample("report")).unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);

        let found = find_by_id(&db, doc.id).unwrap().unwrap();
        assert_eq!(found.original_filename, "report.pdf");
        assert_eq!(found.file_size, 1000);
        assert_eq!(found.file_path, PathBuf::from("uploads/report-uuid.pdf"));
        assert_eq!(found.status, DocumentStatus::Uploaded);
    }

    #[test]
    fn find_nonexistent() {
        assert!(find_by_id(&test_db(), 42).unwrap().is_none());
    }

    #[test]
    fn list_paginates_in_id_order() {
        let db = test_db();
        for n in ["a", "b", "c"] {
            insert(&db, &sample(n)).unwrap();
        }
        let page = list(&db, 1, 5).unwrap();
        let names: Vec<_> = page.iter().map(|d| d.original_filename.as_str()).collect();
        assert_eq!(names, ["b.pdf", "c.pdf"]);
        assert!(list(&db, 3, 10).unwrap().is_empty());
    }

    #[test]
    fn set_status_records_and_clears_error() {
        let db = test_db();
        let doc = insert(&db, &sample("x")).unwrap();

        set_status(&db, doc.id, DocumentStatus::Failed, Some("boom")).unwrap();
        let failed = find_by_id(&db, doc.id).unwrap().unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        set_status(&db, doc.id, DocumentStatus::Processing, None).unwrap();
        let again = find_by_id(&db, doc.id).unwrap().unwrap();
        assert_eq!(again.status, DocumentStatus::Processing);
        assert!(again.error_message.is_none());
    }

    #[test]
    fn set_status_on_missing_row_errors() {
        let err = set_status(&test_db(), 9, DocumentStatus::Processing, None).unwrap_err();
        assert!(matches!(err, DatabaseError::RowNotFound { id: 9, .. }));
    }

    #[test]
    fn delete_reports_existence() {
        let db = test_db();
        let doc = insert(&db, &sample("gone")).unwrap();
        assert!(delete(&db, doc.id).unwrap());
        assert!(!delete(&db, doc.id).unwrap());
        assert!(find_by_id(&db, doc.id).unwrap().is_none());
    }
}
