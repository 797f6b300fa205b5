//! yt-dlp backed resolver
//!
//! Runs `yt-dlp --dump-single-json --no-playlist -f best <url>` and takes the
//! direct media URL and title from the JSON. Playlist results use their first
//! entry.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use super::{Resolver, DEFAULT_REMOTE_NAME};
use crate::config::ResolverConfig;
use crate::error::{Result, StreamError};
use crate::source::MediaSource;
use crate::tool::ToolCommand;

#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(ytdlp_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ytdlp_path,
            timeout,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            config.ytdlp_path.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, url: &Url) -> Result<MediaSource> {
        let mut cmd = ToolCommand::new(self.ytdlp_path.clone());
        cmd.args(["--dump-single-json", "--no-playlist", "--quiet", "-f", "best"])
            .arg(url.as_str())
            .timeout(self.timeout);

        let output = cmd
            .execute()
            .await
            .map_err(|e| StreamError::ResolutionFailed(e.to_string()))?;

        let source = parse_ytdlp_json(&output.stdout)?;
        tracing::info!(url = %url, title = %source.display_name, "Resolved remote source");
        Ok(source)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    title: Option<String>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
}

/// Extract the playable URL and title from yt-dlp's JSON output.
pub fn parse_ytdlp_json(json: &str) -> Result<MediaSource> {
    let mut info: YtDlpInfo = serde_json::from_str(json)
        .map_err(|e| StreamError::ResolutionFailed(format!("unexpected yt-dlp output: {}", e)))?;

    if let Some(entries) = info.entries.take() {
        info = entries
            .into_iter()
            .next()
            .ok_or_else(|| StreamError::ResolutionFailed("playlist has no entries".to_string()))?;
    }

    let locator = info
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| StreamError::ResolutionFailed("no playable URL found".to_string()))?;

    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string());

    Ok(MediaSource::remote(locator, title))
}
