//! Media probing
//!
//! [`FfprobeProber`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams -select_streams a`
//! and maps the JSON into [`MediaInfo`].

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::{AudioTrack, MediaDuration, MediaInfo};
use crate::config::{ProbeConfig, TranscoderConfig};
use crate::source::MediaSource;
use crate::tool::{ToolCommand, ToolError};

/// Probe failures. These never reach clients; see [`Prober::probe_or_default`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("ffprobe JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reads audio tracks and duration from a source
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, source: &MediaSource) -> Result<MediaInfo, ProbeError>;

    /// Probe, degrading any failure to an empty result (zero duration, no
    /// audio tracks) so a session can still start.
    async fn probe_or_default(&self, source: &MediaSource) -> MediaInfo {
        match self.probe(source).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    locator = %source.locator,
                    error = %e,
                    "Probe failed, continuing with unknown duration and no audio tracks"
                );
                MediaInfo::default()
            }
        }
    }
}

/// A prober backed by the `ffprobe` CLI
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
    user_agent: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            ffprobe_path,
            timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(probe: &ProbeConfig, transcoder: &TranscoderConfig) -> Self {
        Self::new(
            probe.ffprobe_path.clone(),
            Duration::from_secs(probe.timeout_secs),
            transcoder.user_agent.clone(),
        )
    }

    fn command(&self, source: &MediaSource) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "a",
        ]);
        if source.is_remote() {
            cmd.arg("-user_agent").arg(self.user_agent.clone());
        }
        cmd.arg(source.locator.clone());
        cmd.timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, source: &MediaSource) -> Result<MediaInfo, ProbeError> {
        let output = self.command(source).execute().await?;
        let info = parse_ffprobe_json(&output.stdout)?;
        tracing::debug!(
            locator = %source.locator,
            audio_tracks = info.audio_tracks.len(),
            duration = %info.duration,
            "Probed source"
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

/// Map ffprobe's JSON output into [`MediaInfo`].
///
/// Audio tracks are numbered by their position among audio streams, which is
/// what ffmpeg's `0:a:N` stream specifier expects.
pub fn parse_ffprobe_json(json: &str) -> Result<MediaInfo, serde_json::Error> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    let duration = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .map(MediaDuration::from_secs_f64)
        .unwrap_or_default();

    let audio_tracks = output
        .streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref().map_or(true, |t| t == "audio"))
        .enumerate()
        .map(|(index, s)| AudioTrack {
            index,
            language: s.tags.language,
        })
        .collect();

    Ok(MediaInfo {
        audio_tracks,
        duration,
    })
}
