use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Could not render the frame at {position:.2}s: {reason}")]
    RenderingUnavailable { position: f64, reason: String },

    #[error(
        "Failed to communicate with the description service. Please check your API key and network connection. ({reason})"
    )]
    RemoteService { reason: String },

    #[error("Playback failed: {reason}")]
    Playback { reason: String },

    #[error("Video duration is not finite; only local files with a known length can be analyzed")]
    UnboundedDuration,

    #[error("Cannot sample a {duration:.2}s video every {interval}s")]
    UnsupportedSampling { duration: f64, interval: f64 },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Video file not found: {path}")]
    SourceUnavailable { path: PathBuf },

    #[error("An analysis run is already in progress")]
    RunInProgress,

    #[error("No video loaded")]
    NoVideoLoaded,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ScribeError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        ScribeError::RemoteService { reason }
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
