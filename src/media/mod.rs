//! Media metadata
//!
//! This module describes what the session needs to know about a source:
//! - Audio tracks and their language tags (one output stream per track)
//! - Total duration, both as seconds and as a display string
//! - The [`Prober`] contract and its ffprobe-backed implementation

pub mod duration;
pub mod probe;

use serde::Serialize;

pub use duration::MediaDuration;
pub use probe::{FfprobeProber, ProbeError, Prober};

/// Language tag used when a track carries none
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// A single audio track of the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    /// Position among the source's audio streams (the `N` in `0:a:N`)
    pub index: usize,
    pub language: Option<String>,
}

impl AudioTrack {
    pub fn new(index: usize, language: Option<&str>) -> Self {
        Self {
            index,
            language: language.map(str::to_string),
        }
    }

    /// Language tag to write into the output stream metadata
    pub fn language_tag(&self) -> &str {
        match self.language.as_deref() {
            Some(l) if !l.trim().is_empty() => l,
            _ => UNDETERMINED_LANGUAGE,
        }
    }
}

/// Probe result for a source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub audio_tracks: Vec<AudioTrack>,
    pub duration: MediaDuration,
}
