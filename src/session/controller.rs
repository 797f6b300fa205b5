//! Session controller
//!
//! Start, Seek and Status for the single playback session.
//!
//! Start and Seek are serialized by the lifecycle lock, which is held from
//! the termination of the previous transcoder until the new one is recorded
//! in the session. The relaunch itself happens in a background task that
//! carries the lock guard, so the request returns while the output is still
//! being produced.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::ServerConfig;
use crate::error::{Result, StreamError};
use crate::media::{FfprobeProber, MediaDuration, Prober};
use crate::metrics::Metrics;
use crate::resolve::{Resolver, SourcePolicy, YtDlpResolver};
use crate::source::{MediaSource, SourceDescriptor};
use crate::state::{SessionSnapshot, SessionState};
use crate::storage::{Readiness, SegmentStore, UploadStore};
use crate::transcode::{Supervisor, TranscodeJob};

/// Largest accepted seek offset, in seconds.
pub const MAX_OFFSET_SECS: f64 = u32::MAX as f64;

/// Result of a successful Start
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub display_name: String,
    pub duration: MediaDuration,
    pub epoch: u64,
}

/// Status report. Never waits on the transcoder.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub processing: bool,
    pub offset: f64,
    pub epoch: u64,
    pub readiness: Readiness,
    pub session: SessionSnapshot,
}

/// Owns the session lifecycle
pub struct SessionController {
    state: Arc<SessionState>,
    lifecycle: Arc<AsyncMutex<()>>,
    supervisor: Arc<Supervisor>,
    store: SegmentStore,
    uploads: UploadStore,
    policy: SourcePolicy,
    prober: Arc<dyn Prober>,
    resolver: Arc<dyn Resolver>,
    metrics: Arc<Metrics>,
}

impl SessionController {
    pub fn new(
        config: &ServerConfig,
        prober: Arc<dyn Prober>,
        resolver: Arc<dyn Resolver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state: Arc::new(SessionState::new()),
            lifecycle: Arc::new(AsyncMutex::new(())),
            supervisor: Arc::new(Supervisor::new(config.transcoder.clone())),
            store: SegmentStore::new(config.storage.segment_dir.clone()),
            uploads: UploadStore::new(config.storage.upload_dir.clone()),
            policy: SourcePolicy::new(config.resolver.allowed_hosts.clone()),
            prober,
            resolver,
            metrics,
        }
    }

    /// Controller backed by ffprobe and yt-dlp.
    pub fn from_config(config: &ServerConfig, metrics: Arc<Metrics>) -> Self {
        let prober = Arc::new(FfprobeProber::from_config(&config.probe, &config.transcoder));
        let resolver = Arc::new(YtDlpResolver::from_config(&config.resolver));
        Self::new(config, prober, resolver, metrics)
    }

    /// Where uploads are received and kept.
    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Begin a new session on `descriptor`, replacing any current one.
    ///
    /// Remote descriptors are checked and resolved before the running
    /// transcoder is touched, so a rejected URL leaves the old session
    /// playing.
    pub async fn start(&self, descriptor: SourceDescriptor) -> Result<StartedSession> {
        let resolved = match &descriptor {
            SourceDescriptor::Remote(raw) => {
                let url = self.policy.check(raw)?;
                Some(self.resolver.resolve(&url).await?)
            }
            SourceDescriptor::Upload(file) => {
                if let Err(e) = UploadStore::file_name_for(file) {
                    self.uploads.discard(file).await;
                    return Err(e);
                }
                None
            }
        };

        let guard = self.lifecycle.clone().lock_owned().await;
        self.stop_current().await;
        self.store.clear().await?;

        let source = match (descriptor, resolved) {
            (_, Some(source)) => source,
            (SourceDescriptor::Upload(file), None) => {
                let path = self.uploads.store(&file).await?;
                let name = UploadStore::file_name_for(&file)?;
                MediaSource::local(path.to_string_lossy(), name)
            }
            (SourceDescriptor::Remote(raw), None) => {
                return Err(StreamError::ResolutionFailed(format!("{} was not resolved", raw)))
            }
        };

        let media = self.prober.probe_or_default(&source).await;
        let epoch = self.state.begin_start(source.clone(), media.clone());
        self.metrics.record_session_start();

        tracing::info!(
            epoch,
            kind = %source.kind,
            source = %source.display_name,
            duration = %media.duration,
            audio_tracks = media.audio_tracks.len(),
            "Session started"
        );

        let job = TranscodeJob {
            source: source.clone(),
            offset: 0.0,
            audio_tracks: media.audio_tracks,
            manifest_path: self.store.manifest_path(),
        };
        self.spawn_launch(guard, epoch, job);

        Ok(StartedSession {
            display_name: source.display_name,
            duration: media.duration,
            epoch,
        })
    }

    /// Restart the transcoder of the current session at `offset` seconds.
    pub async fn seek(&self, offset: f64) -> Result<f64> {
        if !offset.is_finite() || !(0.0..=MAX_OFFSET_SECS).contains(&offset) {
            return Err(StreamError::InvalidOffset(offset));
        }
        if !self.state.has_source() {
            return Err(StreamError::NoActiveSession);
        }

        let guard = self.lifecycle.clone().lock_owned().await;
        self.stop_current().await;
        self.store.clear().await?;

        let target = self.state.begin_seek(offset)?;
        self.metrics.record_seek();
        tracing::info!(epoch = target.epoch, offset, "Seeking");

        let job = TranscodeJob {
            source: target.source,
            offset,
            audio_tracks: target.audio_tracks,
            manifest_path: self.store.manifest_path(),
        };
        self.spawn_launch(guard, target.epoch, job);

        Ok(offset)
    }

    pub async fn status(&self) -> SessionStatus {
        let session = self.state.snapshot();
        let readiness = match self.store.readiness().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Failed to list segment store: {}", e);
                Readiness::default()
            }
        };

        SessionStatus {
            ready: readiness.is_ready(),
            processing: session.is_processing,
            offset: session.current_offset,
            epoch: session.epoch,
            readiness,
            session,
        }
    }

    /// Stop the running transcoder, if any. Used on server shutdown.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_current().await;
    }

    async fn stop_current(&self) {
        let Some(handle) = self.state.current_process() else {
            return;
        };

        tracing::info!(
            epoch = handle.epoch(),
            pid = handle.pid().unwrap_or_default(),
            "Stopping transcoder"
        );
        let outcome = self.supervisor.terminate(&handle).await;
        if outcome.forced {
            self.metrics.record_forced_kill();
        }
        self.state.release(handle.epoch());
    }

    fn spawn_launch(&self, guard: OwnedMutexGuard<()>, epoch: u64, job: TranscodeJob) {
        let state = self.state.clone();
        let supervisor = self.supervisor.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let handle = match supervisor.launch(&job, epoch) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(epoch, "Failed to launch transcoder: {}", e);
                    metrics.record_spawn_failure();
                    metrics.record_error(e.kind());
                    state.fail_launch(epoch, &e);
                    return;
                }
            };
            metrics.record_launch();

            let mut exit = handle.exit_signal();
            if let Err(orphan) = state.attach(handle) {
                tracing::warn!(epoch, "Session moved on before the transcoder was recorded");
                supervisor.terminate(&orphan).await;
                return;
            }
            drop(guard);

            let outcome = exit.wait().await;
            if outcome.is_failure() {
                metrics.record_failed_exit();
            }
            if !state.finish(epoch, &outcome) {
                tracing::debug!(epoch, "Ignoring exit of superseded transcoder");
            }
        });
    }
}
