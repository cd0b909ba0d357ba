//! On-disk buffer for uploads in flight.
//!
//! Multipart bodies are streamed chunk by chunk into a file named after a
//! fresh UUID, so the client-supplied filename never touches the path. A
//! [`StagedFile`] owns its bytes on disk: they are removed when it is
//! discarded or dropped, so an abandoned request leaves nothing behind.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ApiError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .or_else(|_| target.strip_prefix(base))
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ApiError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ApiError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    base_path: PathBuf,
    max_size: usize,
}

impl StagingArea {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ApiError::Internal(format!(
                "Failed to create staging directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Staging area initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Open a new staged file for an upload named `filename`.
    pub async fn create(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<StagingWriter, ApiError> {
        let id = Uuid::new_v4();
        let path = ensure_within(&self.base_path, &self.base_path.join(id.to_string()))?;
        let file = fs::File::create(&path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create staged file: {e}")))?;

        debug!(id = %id, filename, "Staging upload");
        Ok(StagingWriter {
            file,
            staged: StagedFile {
                path,
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                size: 0,
                removed: false,
            },
            max_size: self.max_size,
        })
    }

    /// Count files currently staged.
    pub async fn pending(&self) -> Result<usize, ApiError> {
        let mut count = 0;
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to list staging area: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to read staging entry: {e}")))?
        {
            if Uuid::parse_str(&entry.file_name().to_string_lossy()).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }
}

pub struct StagingWriter {
    file: fs::File,
    staged: StagedFile,
    max_size: usize,
}

impl StagingWriter {
    /// Append a chunk. Fails once the upload would exceed the size limit.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ApiError> {
        let size = self.staged.size.saturating_add(chunk.len());
        if size > self.max_size {
            return Err(ApiError::BadRequest(format!(
                "File too large (max {} bytes)",
                self.max_size
            )));
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write staged file: {e}")))?;
        self.staged.size = size;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StagedFile, ApiError> {
        self.file
            .flush()
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to flush staged file: {e}")))?;
        Ok(self.staged)
    }

    /// Drop a partially written upload.
    pub async fn abort(self) {
        drop(self.file);
        self.staged.discard().await;
    }
}

/// A fully received upload waiting to be processed.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    removed: bool,
}

/// Upload bytes loaded into memory, detached from the staging area.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Bytes, ApiError> {
        fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|e| ApiError::Internal(format!("Failed to read staged file: {e}")))
    }

    /// Load the bytes and release the staged file, whether or not the read
    /// succeeded.
    pub async fn into_upload(mut self) -> Result<ReceivedUpload, ApiError> {
        let bytes = self.read().await;
        let filename = std::mem::take(&mut self.filename);
        let content_type = std::mem::take(&mut self.content_type);
        let size = self.size;
        self.discard().await;
        Ok(ReceivedUpload {
            bytes: bytes?,
            filename,
            content_type,
            size,
        })
    }

    /// Remove the staged bytes. Failures are only logged.
    pub async fn discard(mut self) {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Deleted staged file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete staged file"),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Deleted abandoned staged file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete staged file"),
        }
    }
}
