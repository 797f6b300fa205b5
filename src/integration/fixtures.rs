//! Test fixtures for integration tests
//!
//! Provides stand-ins for the external tools so the session lifecycle can be
//! exercised without ffmpeg, ffprobe or yt-dlp installed:
//! - shell scripts that behave like a transcoder (unix only)
//! - a prober and a resolver with canned answers
//! - a scratch environment with its own segment and upload directories

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

use crate::config::{ServerConfig, TranscoderConfig};
use crate::error::{Result, StreamError};
use crate::media::{AudioTrack, MediaDuration, MediaInfo, ProbeError, Prober};
use crate::metrics::Metrics;
use crate::resolve::Resolver;
use crate::session::{SessionController, SessionStatus};
use crate::source::{MediaSource, SourceDescriptor, UploadedFile};
use crate::state::AppState;

/// Writes the manifest and two media segments next to the output path given
/// as its last argument, records its arguments, then idles until signalled.
#[cfg(unix)]
const FAKE_TRANSCODER: &str = r#"#!/bin/sh
for last; do :; done
dir=$(dirname "$last")
printf '%s\n' "$@" > "$dir.args"
sleep 0.4
mkdir -p "$dir"
printf 'init' > "$dir/init-stream0.m4s"
printf 'seg' > "$dir/chunk-stream0-00001.m4s"
printf 'seg' > "$dir/chunk-stream0-00002.m4s"
printf '<MPD/>' > "$last"
exec sleep 30
"#;

/// Ignores SIGTERM.
#[cfg(unix)]
const STUBBORN_TRANSCODER: &str = r#"#!/bin/sh
trap '' TERM
while true; do sleep 1; done
"#;

/// Fails the way ffmpeg does on unreadable input.
#[cfg(unix)]
const FAILING_TRANSCODER: &str = r#"#!/bin/sh
echo "Invalid data found when processing input" >&2
exit 1
"#;

/// Scripts are written once per test process; rewriting an executable other
/// tests may be running fails with ETXTBSY.
#[cfg(unix)]
fn script(name: &str, body: &str) -> PathBuf {
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Mutex, OnceLock};

    static DIR: OnceLock<TempDir> = OnceLock::new();
    static WRITTEN: OnceLock<Mutex<HashMap<String, PathBuf>>> = OnceLock::new();

    let dir = DIR.get_or_init(|| tempfile::tempdir().expect("script dir"));
    let mut written = WRITTEN
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("script registry");

    written
        .entry(name.to_string())
        .or_insert_with(|| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).expect("write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod script");
            path
        })
        .clone()
}

#[cfg(unix)]
pub fn fake_transcoder() -> PathBuf {
    script("fake-ffmpeg.sh", FAKE_TRANSCODER)
}

#[cfg(unix)]
pub fn stubborn_transcoder() -> PathBuf {
    script("stubborn-ffmpeg.sh", STUBBORN_TRANSCODER)
}

#[cfg(unix)]
pub fn failing_transcoder() -> PathBuf {
    script("failing-ffmpeg.sh", FAILING_TRANSCODER)
}

/// Transcoder settings with short timings for tests.
pub fn transcoder_config(ffmpeg_path: PathBuf) -> TranscoderConfig {
    TranscoderConfig {
        ffmpeg_path,
        grace_period_ms: 500,
        settle_delay_ms: 20,
        ..TranscoderConfig::default()
    }
}

/// Prober with a fixed answer
#[derive(Debug, Default)]
pub struct MockProber {
    pub info: MediaInfo,
    pub calls: AtomicUsize,
}

impl MockProber {
    pub fn with_tracks(languages: &[Option<&str>], duration_secs: f64) -> Self {
        Self {
            info: MediaInfo {
                audio_tracks: languages
                    .iter()
                    .enumerate()
                    .map(|(i, l)| AudioTrack::new(i, *l))
                    .collect(),
                duration: MediaDuration::from_secs_f64(duration_secs),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, _source: &MediaSource) -> std::result::Result<MediaInfo, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }
}

/// Resolver that maps every URL to the same playable stream
#[derive(Debug, Default)]
pub struct MockResolver {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl MockResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, url: &Url) -> Result<MediaSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StreamError::ResolutionFailed(format!("{} is unreachable", url)));
        }
        Ok(MediaSource::remote("https://cdn.example/stream.mp4", "Remote Clip"))
    }
}

/// A scratch server environment
pub struct TestEnv {
    pub root: TempDir,
    pub config: ServerConfig,
    pub metrics: Arc<Metrics>,
    pub prober: Arc<MockProber>,
    pub resolver: Arc<MockResolver>,
}

impl TestEnv {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self::with_prober(ffmpeg_path, MockProber::with_tracks(&[Some("eng")], 125.0))
    }

    pub fn with_prober(ffmpeg_path: PathBuf, prober: MockProber) -> Self {
        let root = tempfile::tempdir().expect("temp root");
        let mut config = ServerConfig::default();
        config.storage.segment_dir = root.path().join("video");
        config.storage.upload_dir = root.path().join("uploads");
        config.transcoder = transcoder_config(ffmpeg_path);

        Self {
            root,
            config,
            metrics: Arc::new(Metrics::new()),
            prober: Arc::new(prober),
            resolver: Arc::new(MockResolver::default()),
        }
    }

    pub fn controller(&self) -> SessionController {
        SessionController::new(
            &self.config,
            self.prober.clone(),
            self.resolver.clone(),
            self.metrics.clone(),
        )
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState::with_controller(
            self.config.clone(),
            self.controller(),
            self.metrics.clone(),
        ))
    }

    pub fn segment_dir(&self) -> &Path {
        &self.config.storage.segment_dir
    }

    /// Arguments the fake transcoder was last started with.
    pub fn last_args(&self) -> Vec<String> {
        let path = self.segment_dir().with_extension("args");
        std::fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// An upload already received into a staging file.
pub fn upload(name: &str) -> SourceDescriptor {
    const DATA: &[u8] = b"not really a movie";
    let staged = std::env::temp_dir().join(format!("dash-upload-{}.part", uuid::Uuid::new_v4()));
    std::fs::write(&staged, DATA).expect("staged upload");
    SourceDescriptor::Upload(UploadedFile {
        file_name: name.to_string(),
        staged,
        size: DATA.len() as u64,
    })
}

/// Poll `status` until `pred` holds or `timeout` passes.
pub async fn wait_for(
    controller: &SessionController,
    timeout: Duration,
    pred: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = controller.status().await;
        if pred(&status) || tokio::time::Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
