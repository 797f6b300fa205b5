//! Upload storage
//!
//! Uploads are streamed into a staging directory next to the upload
//! directory while the request is read. Only one upload is kept: storing a
//! new file discards whatever the upload directory held before and moves the
//! staged file in.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::source::UploadedFile;

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    incoming: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let incoming = dir.with_extension("incoming");
        Self { dir, incoming }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn incoming_dir(&self) -> &Path {
        &self.incoming
    }

    /// The name a client-supplied file name is stored under.
    pub fn check_name(raw: &str) -> Result<String> {
        sanitize_file_name(raw)
            .ok_or_else(|| StreamError::InvalidRequest("No filename".to_string()))
    }

    /// The name `file` will be stored under.
    pub fn file_name_for(file: &UploadedFile) -> Result<String> {
        Self::check_name(&file.file_name)
    }

    /// Create a fresh staging file for an upload being received.
    pub async fn stage(&self) -> Result<(PathBuf, File)> {
        tokio::fs::create_dir_all(&self.incoming).await?;
        let path = self.incoming.join(format!("{}.part", Uuid::new_v4()));
        let file = File::create(&path)
            .await
            .map_err(|e| StreamError::UploadFailed(format!("cannot create {}: {}", path.display(), e)))?;
        Ok((path, file))
    }

    /// Remove a staged file that will not be stored.
    pub async fn discard(&self, file: &UploadedFile) {
        self.discard_staged(&file.staged).await;
    }

    pub async fn discard_staged(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::debug!("Failed to remove staged upload {}: {}", path.display(), e);
        }
    }

    /// Replace the directory contents with `file`, returning its local path.
    pub async fn store(&self, file: &UploadedFile) -> Result<PathBuf> {
        let name = match Self::file_name_for(file) {
            Ok(name) => name,
            Err(e) => {
                self.discard(file).await;
                return Err(e);
            }
        };

        if tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::remove_dir_all(&self.dir)
                .await
                .map_err(|e| StreamError::UploadFailed(format!("cannot discard previous upload: {}", e)))?;
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(&name);
        if let Err(e) = tokio::fs::rename(&file.staged, &path).await {
            // staging area on another filesystem
            tracing::debug!("Rename of {} failed ({}), copying", file.staged.display(), e);
            tokio::fs::copy(&file.staged, &path)
                .await
                .map_err(|e| StreamError::UploadFailed(format!("cannot write {}: {}", name, e)))?;
            self.discard(file).await;
        }

        tracing::info!("Stored upload {} ({} bytes)", path.display(), file.size);
        Ok(path)
    }
}

/// Reduce a client-supplied name to its final path component.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('.');

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
