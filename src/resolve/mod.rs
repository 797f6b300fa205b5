//! Remote source resolution
//!
//! Turns a client-supplied URL into a playable media URL and a display name.
//! Only URLs whose host belongs to the configured source family are accepted;
//! anything else is rejected before any resolver runs.

pub mod ytdlp;

use async_trait::async_trait;
use url::Url;

use crate::error::{Result, StreamError};
use crate::source::MediaSource;

pub use ytdlp::YtDlpResolver;

/// Display name used when the resolver reports no title
pub const DEFAULT_REMOTE_NAME: &str = "Web Stream";

/// Resolves an allowed remote descriptor into a [`MediaSource`]
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &Url) -> Result<MediaSource>;
}

/// Allow-list of remote source hosts
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    allowed_hosts: Vec<String>,
}

impl SourcePolicy {
    pub fn new(allowed_hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.into().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Parse `raw` and check it against the allow-list.
    ///
    /// The host must equal an allowed host or be a subdomain of one.
    pub fn check(&self, raw: &str) -> Result<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StreamError::InvalidRequest("No URL".to_string()));
        }

        let url = Url::parse(raw)
            .map_err(|e| StreamError::ResolutionFailed(format!("invalid URL {}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(StreamError::DisallowedSource(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| StreamError::DisallowedSource(format!("no host in {}", raw)))?;

        let allowed = self
            .allowed_hosts
            .iter()
            .any(|a| host == *a || host.ends_with(&format!(".{}", a)));

        if !allowed {
            return Err(StreamError::DisallowedSource(format!(
                "only links to {} are allowed",
                self.allowed_hosts.join(", ")
            )));
        }

        Ok(url)
    }
}
