//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Segment store and upload locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the transcoder writes the manifest and segments into
    pub segment_dir: PathBuf,

    /// Directory holding the most recent upload
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            segment_dir: PathBuf::from("static/video"),
            upload_dir: PathBuf::from("static/uploads"),
        }
    }
}

/// Transcoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,

    /// Video encoder
    pub video_codec: String,

    /// Constant rate factor for the video encoder
    pub crf: u32,

    /// Encoder preset
    pub preset: String,

    /// Encoder tune
    pub tune: String,

    /// Forced keyframe cadence in seconds
    pub keyframe_interval_secs: u32,

    /// DASH segment duration in seconds
    pub segment_duration_secs: u32,

    /// Number of segments the manifest keeps referenced
    pub window_size: u32,

    /// Audio encoder
    pub audio_codec: String,

    /// Audio bitrate (ffmpeg notation, e.g. "128k")
    pub audio_bitrate: String,

    /// User agent passed to ffmpeg for remote sources
    pub user_agent: String,

    /// How long a terminated transcoder gets to exit before it is killed
    pub grace_period_ms: u64,

    /// Pause after a confirmed exit before the segment store may be reused
    pub settle_delay_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            keyframe_interval_secs: 4,
            segment_duration_secs: 4,
            window_size: 50000,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            grace_period_ms: 2000,
            settle_delay_ms: 500,
        }
    }
}

impl TranscoderConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Media probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Path to the ffprobe binary
    pub ffprobe_path: PathBuf,

    /// Upper bound on a single probe
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout_secs: 30,
        }
    }
}

/// Remote source resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Path to the yt-dlp binary
    pub ytdlp_path: PathBuf,

    /// Hosts remote descriptors may point at (subdomains included)
    pub allowed_hosts: Vec<String>,

    /// Upper bound on a single resolution
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            allowed_hosts: vec!["drive.google.com".to_string()],
            timeout_secs: 60,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (pretty, json)
    pub log_format: String,

    /// Maximum accepted upload size in megabytes
    pub max_upload_mb: usize,

    pub storage: StorageConfig,

    pub transcoder: TranscoderConfig,

    pub probe: ProbeConfig,

    pub resolver: ResolverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_upload_mb: 4096,
            storage: StorageConfig::default(),
            transcoder: TranscoderConfig::default(),
            probe: ProbeConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Maximum upload size in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}
