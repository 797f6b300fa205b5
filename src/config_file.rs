//! Configuration file support
//!
//! Loads server configuration from TOML files. Every section except
//! `[server]` may be omitted, as may any optional field; missing values
//! fall back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{ProbeConfig, ResolverConfig, ServerConfig, StorageConfig, TranscoderConfig};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Storage settings
    pub storage: Option<StorageSettings>,
    /// Transcoder settings
    pub transcoder: Option<TranscoderSettings>,
    /// Probe settings
    pub probe: Option<ProbeSettings>,
    /// Resolver settings
    pub resolver: Option<ResolverSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
    /// Maximum upload size in MB
    pub max_upload_mb: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub segment_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderSettings {
    pub ffmpeg_path: Option<PathBuf>,
    pub video_codec: Option<String>,
    pub crf: Option<u32>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub keyframe_interval_secs: Option<u32>,
    pub segment_duration_secs: Option<u32>,
    pub window_size: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
    pub user_agent: Option<String>,
    pub grace_period_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub ffprobe_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    pub ytdlp_path: Option<PathBuf>,
    pub allowed_hosts: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = ServerConfig::default();
        let storage = defaults.storage;
        let transcoder = defaults.transcoder;
        let probe = defaults.probe;
        let resolver = defaults.resolver;

        Self {
            server: ServerSettings {
                host: defaults.host,
                port: defaults.port,
                cors_enabled: Some(defaults.cors_enabled),
                max_upload_mb: Some(defaults.max_upload_mb),
            },
            storage: Some(StorageSettings {
                segment_dir: Some(storage.segment_dir),
                upload_dir: Some(storage.upload_dir),
            }),
            transcoder: Some(TranscoderSettings {
                ffmpeg_path: Some(transcoder.ffmpeg_path),
                video_codec: Some(transcoder.video_codec),
                crf: Some(transcoder.crf),
                preset: Some(transcoder.preset),
                tune: Some(transcoder.tune),
                keyframe_interval_secs: Some(transcoder.keyframe_interval_secs),
                segment_duration_secs: Some(transcoder.segment_duration_secs),
                window_size: Some(transcoder.window_size),
                audio_codec: Some(transcoder.audio_codec),
                audio_bitrate: Some(transcoder.audio_bitrate),
                user_agent: Some(transcoder.user_agent),
                grace_period_ms: Some(transcoder.grace_period_ms),
                settle_delay_ms: Some(transcoder.settle_delay_ms),
            }),
            probe: Some(ProbeSettings {
                ffprobe_path: Some(probe.ffprobe_path),
                timeout_secs: Some(probe.timeout_secs),
            }),
            resolver: Some(ResolverSettings {
                ytdlp_path: Some(resolver.ytdlp_path),
                allowed_hosts: Some(resolver.allowed_hosts),
                timeout_secs: Some(resolver.timeout_secs),
            }),
            logging: Some(LoggingSettings {
                level: defaults.log_level,
                format: Some(defaults.log_format),
            }),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();

        let storage = match self.storage {
            Some(s) => StorageConfig {
                segment_dir: s.segment_dir.unwrap_or(defaults.storage.segment_dir),
                upload_dir: s.upload_dir.unwrap_or(defaults.storage.upload_dir),
            },
            None => defaults.storage,
        };

        let transcoder = match self.transcoder {
            Some(t) => {
                let d = defaults.transcoder;
                TranscoderConfig {
                    ffmpeg_path: t.ffmpeg_path.unwrap_or(d.ffmpeg_path),
                    video_codec: t.video_codec.unwrap_or(d.video_codec),
                    crf: t.crf.unwrap_or(d.crf),
                    preset: t.preset.unwrap_or(d.preset),
                    tune: t.tune.unwrap_or(d.tune),
                    keyframe_interval_secs: t
                        .keyframe_interval_secs
                        .unwrap_or(d.keyframe_interval_secs),
                    segment_duration_secs: t
                        .segment_duration_secs
                        .unwrap_or(d.segment_duration_secs),
                    window_size: t.window_size.unwrap_or(d.window_size),
                    audio_codec: t.audio_codec.unwrap_or(d.audio_codec),
                    audio_bitrate: t.audio_bitrate.unwrap_or(d.audio_bitrate),
                    user_agent: t.user_agent.unwrap_or(d.user_agent),
                    grace_period_ms: t.grace_period_ms.unwrap_or(d.grace_period_ms),
                    settle_delay_ms: t.settle_delay_ms.unwrap_or(d.settle_delay_ms),
                }
            }
            None => defaults.transcoder,
        };

        let probe = match self.probe {
            Some(p) => ProbeConfig {
                ffprobe_path: p.ffprobe_path.unwrap_or(defaults.probe.ffprobe_path),
                timeout_secs: p.timeout_secs.unwrap_or(defaults.probe.timeout_secs),
            },
            None => defaults.probe,
        };

        let resolver = match self.resolver {
            Some(r) => ResolverConfig {
                ytdlp_path: r.ytdlp_path.unwrap_or(defaults.resolver.ytdlp_path),
                allowed_hosts: r.allowed_hosts.unwrap_or(defaults.resolver.allowed_hosts),
                timeout_secs: r.timeout_secs.unwrap_or(defaults.resolver.timeout_secs),
            },
            None => defaults.resolver,
        };

        let (log_level, log_format) = match self.logging {
            Some(l) => (l.level, l.format.unwrap_or(defaults.log_format)),
            None => (defaults.log_level, defaults.log_format),
        };

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            cors_enabled: self.server.cors_enabled.unwrap_or(defaults.cors_enabled),
            log_level,
            log_format,
            max_upload_mb: self.server.max_upload_mb.unwrap_or(defaults.max_upload_mb),
            storage,
            transcoder,
            probe,
            resolver,
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

/// Load the configuration at `path`, falling back to defaults when the file
/// is missing or unreadable.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> ServerConfig {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("No config file at {}, using defaults", path.display());
        return ServerConfig::default();
    }

    match ConfigFile::from_file(path) {
        Ok(cf) => cf.into_server_config(),
        Err(e) => {
            tracing::warn!(
                "Failed to load config file {}: {}. Using defaults.",
                path.display(),
                e
            );
            ServerConfig::default()
        }
    }
}
