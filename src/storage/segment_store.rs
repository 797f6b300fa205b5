//! Segment store
//!
//! The transcoder owns this directory while it runs. The session controller
//! wipes it before every (re)start; the HTTP layer only reads from it.

use regex::Regex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::Result;

/// Manifest file name understood by the player
pub const MANIFEST_NAME: &str = "manifest.mpd";

/// DASH muxer template for initialization segments
pub const INIT_SEGMENT_TEMPLATE: &str = "init-stream$RepresentationID$.m4s";

/// DASH muxer template for media segments
pub const MEDIA_SEGMENT_TEMPLATE: &str = "chunk-stream$RepresentationID$-$Number%05d$.m4s";

/// Media segments needed before playback can start without stalling
pub const MIN_READY_SEGMENTS: usize = 2;

fn file_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:init-stream(?P<init>\d+)\.m4s|chunk-stream(?P<rep>\d+)-(?P<num>\d{5,})\.m4s)$")
            .expect("static regex")
    })
}

/// A file the store may legitimately contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFile {
    Manifest,
    InitSegment { representation: u32 },
    MediaSegment { representation: u32, number: u64 },
}

impl StoreFile {
    /// Classify a bare file name; anything outside the naming scheme is `None`.
    pub fn classify(name: &str) -> Option<StoreFile> {
        if name == MANIFEST_NAME {
            return Some(StoreFile::Manifest);
        }

        let caps = file_name_regex().captures(name)?;
        if let Some(init) = caps.name("init") {
            return Some(StoreFile::InitSegment {
                representation: init.as_str().parse().ok()?,
            });
        }

        Some(StoreFile::MediaSegment {
            representation: caps.name("rep")?.as_str().parse().ok()?,
            number: caps.name("num")?.as_str().parse().ok()?,
        })
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            StoreFile::Manifest => "application/dash+xml",
            StoreFile::InitSegment { .. } => "video/mp4",
            StoreFile::MediaSegment { .. } => "video/iso.segment",
        }
    }
}

/// Readiness verdict over the store's contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub manifest: bool,
    pub media_segments: usize,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.manifest && self.media_segments >= MIN_READY_SEGMENTS
    }
}

/// Assess readiness from a directory listing.
pub fn assess_readiness<I, S>(names: I) -> Readiness
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .fold(Readiness::default(), |mut r, name| {
            match StoreFile::classify(name.as_ref()) {
                Some(StoreFile::Manifest) => r.manifest = true,
                Some(StoreFile::MediaSegment { .. }) => r.media_segments += 1,
                _ => {}
            }
            r
        })
}

/// The shared output directory
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_NAME)
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Remove everything in the store. Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure().await?;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!("Failed to remove {}: {}", path.display(), e);
                    return Err(e.into());
                }
            }
        }

        tracing::debug!("Cleared {} entries from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// File names currently in the store. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Recomputed on every call; the store keeps no readiness state.
    pub async fn readiness(&self) -> Result<Readiness> {
        Ok(assess_readiness(self.list().await?))
    }

    /// Path for a servable file name, or `None` if the name is not part of
    /// the output naming scheme.
    pub fn resolve(&self, name: &str) -> Option<(PathBuf, StoreFile)> {
        StoreFile::classify(name).map(|kind| (self.dir.join(name), kind))
    }
}
