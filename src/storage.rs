//! Local file storage for uploaded PDFs and generated Markdown.
//!
//! Uploads are streamed into a [`tempfile`] inside the upload directory and
//! only renamed to their final `<uuid>.pdf` name once the whole body has
//! arrived within the size limit. The temp file is deleted when the writer
//! is dropped, so an aborted, oversized or panicking upload leaves nothing
//! behind.
//!
//! Exports are written to `<name>.md.tmp` and renamed into place, so a
//! reader never sees a half-written Markdown file.

use crate::error::{Result, ServiceError};
use crate::pipeline::assemble::output_filename;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upload and export directories.
#[derive(Debug, Clone)]
pub struct FileStorage {
    upload_dir: PathBuf,
    export_dir: PathBuf,
    max_upload_size: u64,
}

/// A fully written upload, renamed to its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Name inside the upload directory (`<uuid><ext>`).
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// True if `filename` ends in `.pdf`, ignoring case.
pub fn is_pdf_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

impl FileStorage {
    pub fn new(upload_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>, max_upload_size: u64) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            export_dir: export_dir.into(),
            max_upload_size,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Creates both directories if missing.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.export_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ServiceError::WriteFailed {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Validates the name and opens a writer for a new upload.
    ///
    /// Rejects non-PDF names before anything touches the disk.
    pub fn begin_upload(&self, original_filename: &str) -> Result<UploadWriter> {
        if !is_pdf_filename(original_filename) {
            return Err(ServiceError::NotAPdf {
                filename: original_filename.to_string(),
            });
        }

        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf");
        let filename = format!("{}.{ext}", Uuid::new_v4());
        let final_path = self.upload_dir.join(&filename);

        let named = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".part")
            .tempfile_in(&self.upload_dir)
            .map_err(|e| ServiceError::WriteFailed {
                path: self.upload_dir.clone(),
                source: e,
            })?;
        let (file, temp_path) = named.into_parts();

        debug!("Receiving upload '{}' → {}", original_filename, final_path.display());

        Ok(UploadWriter {
            file: File::from_std(file),
            temp_path,
            filename,
            final_path,
            written: 0,
            max: self.max_upload_size,
        })
    }

    /// Reads a stored file completely.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ServiceError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Writes `<export_dir>/<stem>_<job_id>.md` atomically and returns its path.
    pub async fn write_export(&self, stored_filename: &str, job_id: i64, markdown: &str) -> Result<PathBuf> {
        let path = self.export_dir.join(output_filename(stored_filename, job_id));
        let write_err = |e| ServiceError::WriteFailed {
            path: path.clone(),
            source: e,
        };

        tokio::fs::create_dir_all(&self.export_dir).await.map_err(write_err)?;

        let tmp_path = path.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, markdown).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        debug!("Wrote {} bytes of markdown to {}", markdown.len(), path.display());
        Ok(path)
    }

    /// Removes a file; a file that is already gone counts as success.
    ///
    /// Returns whether a file was actually removed.
    pub async fn remove_if_exists(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File already missing: {}", path.display());
                Ok(false)
            }
            Err(e) => Err(ServiceError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// In-progress upload. Dropping it without [`finish`](Self::finish) deletes
/// the partial file.
#[derive(Debug)]
pub struct UploadWriter {
    file: File,
    temp_path: TempPath,
    filename: String,
    final_path: PathBuf,
    written: u64,
    max: u64,
}

impl UploadWriter {
    /// Appends a chunk, failing with `FileTooLarge` once the running total
    /// passes the limit.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let total = self.written + chunk.len() as u64;
        if total > self.max {
            return Err(ServiceError::FileTooLarge {
                size: total,
                max: self.max,
            });
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| ServiceError::WriteFailed {
                path: self.temp_path.to_path_buf(),
                source: e,
            })?;
        self.written = total;
        Ok(())
    }

    /// Flushes and renames the temp file to its final name.
    pub async fn finish(mut self) -> Result<StoredUpload> {
        let write_err = |path: &Path, e| ServiceError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        self.file
            .flush()
            .await
            .map_err(|e| write_err(&self.final_path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| write_err(&self.final_path, e))?;
        drop(self.file);

        self.temp_path
            .persist(&self.final_path)
            .map_err(|e| write_err(&self.final_path, e.error))?;

        Ok(StoredUpload {
            filename: self.filename,
            path: self.final_path,
            size: self.written,
        })
    }

    /// Discards the partial upload.
    pub async fn abort(self) {
        drop(self.file);
        let path = self.temp_path.to_path_buf();
        match tokio::task::spawn_blocking(move || self.temp_path.close()).await {
            Ok(Ok(())) => debug!("Removed partial upload {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove partial upload {}: {e}", path.display()),
            Err(e) => warn!("Cleanup task for {} panicked: {e}", path.display()),
        }
    }
}
