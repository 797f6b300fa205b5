//! Media source descriptors
//!
//! A [`SourceDescriptor`] is what a client submits to start a session; a
//! [`MediaSource`] is what it resolves to: a concrete locator ffmpeg can
//! open plus a display name.

use serde::Serialize;
use std::path::PathBuf;

/// Where a session's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Remote,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Remote => write!(f, "remote"),
        }
    }
}

/// A file uploaded by the client, received into the staging area
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as sent by the client
    pub file_name: String,
    pub staged: PathBuf,
    pub size: u64,
}

/// Client-supplied source for a new session
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    Upload(UploadedFile),
    Remote(String),
}

/// A resolved, playable source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSource {
    /// Local file path or resolved remote URL
    pub locator: String,
    pub kind: SourceKind,
    pub display_name: String,
}

impl MediaSource {
    pub fn local(locator: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            kind: SourceKind::Local,
            display_name: display_name.into(),
        }
    }

    pub fn remote(locator: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            kind: SourceKind::Remote,
            display_name: display_name.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == SourceKind::Remote
    }
}
