//! Application state management
//!
//! This module defines:
//! - [`SessionState`]: the single playback session record, guarded by a lock
//! - [`AppState`]: what the HTTP handlers share (controller, store, metrics)
//!
//! The session record is only changed through the epoch-aware methods below.
//! A background task that belongs to an older epoch can never overwrite the
//! state of a newer Start or Seek.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{Result, StreamError};
use crate::media::{AudioTrack, MediaDuration, MediaInfo};
use crate::metrics::Metrics;
use crate::session::SessionController;
use crate::source::MediaSource;
use crate::storage::SegmentStore;
use crate::transcode::{ExitOutcome, TranscoderHandle};

/// The session record
#[derive(Debug, Default)]
struct Session {
    id: Option<Uuid>,
    source: Option<MediaSource>,
    media: MediaInfo,
    current_offset: f64,
    is_processing: bool,
    epoch: u64,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    process: Option<TranscoderHandle>,
}

/// Point-in-time copy of the session record
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub source: Option<MediaSource>,
    pub duration: MediaDuration,
    pub audio_tracks: Vec<AudioTrack>,
    pub current_offset: f64,
    pub is_processing: bool,
    pub epoch: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pid: Option<u32>,
}

/// What a Seek needs to relaunch the transcoder
#[derive(Debug, Clone)]
pub struct SeekTarget {
    pub epoch: u64,
    pub source: MediaSource,
    pub audio_tracks: Vec<AudioTrack>,
}

/// Shared session record
#[derive(Debug, Default)]
pub struct SessionState {
    inner: Mutex<Session>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.inner.lock();
        SessionSnapshot {
            id: s.id,
            source: s.source.clone(),
            duration: s.media.duration,
            audio_tracks: s.media.audio_tracks.clone(),
            current_offset: s.current_offset,
            is_processing: s.is_processing,
            epoch: s.epoch,
            started_at: s.started_at,
            last_error: s.last_error.clone(),
            pid: s.process.as_ref().and_then(|p| p.pid()),
        }
    }

    pub fn has_source(&self) -> bool {
        self.inner.lock().source.is_some()
    }

    /// Replace the session with a new source at offset 0. Returns the new
    /// epoch.
    pub fn begin_start(&self, source: MediaSource, media: MediaInfo) -> u64 {
        let mut s = self.inner.lock();
        debug_assert!(s.process.is_none(), "start with a live transcoder");
        s.epoch += 1;
        s.id = Some(Uuid::new_v4());
        s.source = Some(source);
        s.media = media;
        s.current_offset = 0.0;
        s.is_processing = true;
        s.started_at = Some(Utc::now());
        s.last_error = None;
        s.epoch
    }

    /// Move the session to `offset`, keeping source and tracks.
    pub fn begin_seek(&self, offset: f64) -> Result<SeekTarget> {
        let mut s = self.inner.lock();
        debug_assert!(s.process.is_none(), "seek with a live transcoder");
        let source = s.source.clone().ok_or(StreamError::NoActiveSession)?;
        s.epoch += 1;
        s.current_offset = offset;
        s.is_processing = true;
        s.last_error = None;
        Ok(SeekTarget {
            epoch: s.epoch,
            source,
            audio_tracks: s.media.audio_tracks.clone(),
        })
    }

    /// Record the running transcoder for `epoch`. A handle for a superseded
    /// epoch is handed back so the caller can stop it.
    pub fn attach(&self, handle: TranscoderHandle) -> std::result::Result<(), TranscoderHandle> {
        let mut s = self.inner.lock();
        if handle.epoch() != s.epoch || s.process.is_some() {
            return Err(handle);
        }
        s.process = Some(handle);
        Ok(())
    }

    pub fn current_process(&self) -> Option<TranscoderHandle> {
        self.inner.lock().process.clone()
    }

    /// Forget the transcoder of `epoch` after its termination was confirmed.
    pub fn release(&self, epoch: u64) -> bool {
        let mut s = self.inner.lock();
        if s.process.as_ref().map(|p| p.epoch()) != Some(epoch) {
            return false;
        }
        s.process = None;
        if s.epoch == epoch {
            s.is_processing = false;
        }
        true
    }

    /// The transcoder of `epoch` exited on its own. Ignored if a newer
    /// Start or Seek has happened since.
    pub fn finish(&self, epoch: u64, outcome: &ExitOutcome) -> bool {
        let mut s = self.inner.lock();
        if s.epoch != epoch {
            return false;
        }
        if s.process.as_ref().map(|p| p.epoch()) == Some(epoch) {
            s.process = None;
        }
        s.is_processing = false;
        if outcome.is_failure() {
            s.last_error = Some(outcome.describe());
        }
        true
    }

    /// The transcoder of `epoch` could not be launched.
    pub fn fail_launch(&self, epoch: u64, error: &StreamError) -> bool {
        let mut s = self.inner.lock();
        if s.epoch != epoch {
            return false;
        }
        s.is_processing = false;
        s.last_error = Some(error.to_string());
        true
    }
}

/// State shared by the HTTP handlers
pub struct AppState {
    pub controller: SessionController,

    /// Read side of the segment store
    pub store: SegmentStore,

    pub metrics: Arc<Metrics>,

    /// Server shutdown flag
    pub shutdown: AtomicBool,

    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Build the state with ffprobe and yt-dlp backed collaborators.
    pub fn new(config: ServerConfig) -> Self {
        let metrics = Arc::new(Metrics::new());
        let controller = SessionController::from_config(&config, metrics.clone());
        Self::with_controller(config, controller, metrics)
    }

    pub fn with_controller(
        config: ServerConfig,
        controller: SessionController,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: SegmentStore::new(config.storage.segment_dir.clone()),
            controller,
            metrics,
            shutdown: AtomicBool::new(false),
            config,
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown is requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(tracks: usize) -> MediaInfo {
        MediaInfo {
            audio_tracks: (0..tracks).map(|i| AudioTrack::new(i, Some("eng"))).collect(),
            duration: MediaDuration::from_secs_f64(120.0),
        }
    }

    fn exit_failed() -> ExitOutcome {
        ExitOutcome {
            status: None,
            requested: false,
            forced: false,
            last_stderr: Some("Invalid data found when processing input".into()),
        }
    }

    #[test]
    fn test_initial_state_is_idle() {
        let state = SessionState::new();
        let snap = state.snapshot();
        assert!(!snap.is_processing);
        assert!(snap.source.is_none());
        assert_eq!(snap.epoch, 0);
        assert!(!state.has_source());
    }

    #[test]
    fn test_begin_start_resets_offset_and_bumps_epoch() {
        let state = SessionState::new();
        let e1 = state.begin_start(MediaSource::local("/a.mp4", "a.mp4"), media(2));
        state.begin_seek(30.0).unwrap();
        let e3 = state.begin_start(MediaSource::local("/b.mp4", "b.mp4"), media(1));

        assert_eq!(e1, 1);
        assert_eq!(e3, 3);
        let snap = state.snapshot();
        assert_eq!(snap.current_offset, 0.0);
        assert!(snap.is_processing);
        assert_eq!(snap.source.unwrap().display_name, "b.mp4");
        assert_eq!(snap.audio_tracks.len(), 1);
    }

    #[test]
    fn test_seek_without_source() {
        let state = SessionState::new();
        assert!(matches!(
            state.begin_seek(10.0),
            Err(StreamError::NoActiveSession)
        ));
        assert_eq!(state.snapshot().epoch, 0);
    }

    #[test]
    fn test_seek_keeps_source_and_tracks() {
        let state = SessionState::new();
        state.begin_start(MediaSource::local("/a.mp4", "a.mp4"), media(2));
        let target = state.begin_seek(42.5).unwrap();
        assert_eq!(target.epoch, 2);
        assert_eq!(target.source.locator, "/a.mp4");
        assert_eq!(target.audio_tracks.len(), 2);
        assert_eq!(state.snapshot().current_offset, 42.5);
    }

    #[test]
    fn test_stale_exit_is_ignored() {
        let state = SessionState::new();
        let old = state.begin_start(MediaSource::local("/a.mp4", "a.mp4"), media(1));
        state.begin_seek(60.0).unwrap();

        assert!(!state.finish(old, &exit_failed()));
        let snap = state.snapshot();
        assert!(snap.is_processing);
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn test_current_exit_records_error() {
        let state = SessionState::new();
        let epoch = state.begin_start(MediaSource::local("/a.mp4", "a.mp4"), media(1));
        assert!(state.finish(epoch, &exit_failed()));
        let snap = state.snapshot();
        assert!(!snap.is_processing);
        assert!(snap.last_error.unwrap().contains("Invalid data"));
    }

    #[test]
    fn test_launch_failure_is_epoch_guarded() {
        let state = SessionState::new();
        let old = state.begin_start(MediaSource::local("/a.mp4", "a.mp4"), media(1));
        let current = state.begin_seek(5.0).unwrap().epoch;
        let err = StreamError::ProcessSpawnFailed("missing".into());

        assert!(!state.fail_launch(old, &err));
        assert!(state.snapshot().is_processing);

        assert!(state.fail_launch(current, &err));
        let snap = state.snapshot();
        assert!(!snap.is_processing);
        assert!(snap.last_error.unwrap().contains("missing"));
    }
}
