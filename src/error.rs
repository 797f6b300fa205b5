use thiserror::Error;

/// Main error type for session lifecycle operations
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Source not allowed: {0}")]
    DisallowedSource(String),

    #[error("Failed to resolve source: {0}")]
    ResolutionFailed(String),

    #[error("Failed to store upload: {0}")]
    UploadFailed(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Invalid seek offset: {0}")]
    InvalidOffset(f64),

    #[error("Failed to spawn transcoder: {0}")]
    ProcessSpawnFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Machine-readable error kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::InvalidRequest(_) => "InvalidRequest",
            StreamError::DisallowedSource(_) | StreamError::ResolutionFailed(_) => {
                "ResolutionFailed"
            }
            StreamError::UploadFailed(_) => "UploadFailed",
            StreamError::NoActiveSession => "NoActiveSession",
            StreamError::InvalidOffset(_) => "InvalidOffset",
            StreamError::ProcessSpawnFailed(_) => "ProcessSpawnFailed",
            StreamError::Io(_) => "Io",
            StreamError::Config(_) => "Config",
        }
    }

    /// Whether the caller, rather than the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidRequest(_)
                | StreamError::DisallowedSource(_)
                | StreamError::ResolutionFailed(_)
                | StreamError::NoActiveSession
                | StreamError::InvalidOffset(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StreamError>;
