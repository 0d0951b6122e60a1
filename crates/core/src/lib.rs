//! Scenescribe Core Library
//!
//! Samples frames from a local video at a fixed interval, asks a vision model
//! to describe each one, and keeps the results as a timestamped transcript.

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod describe;
pub mod error;
pub mod format;
pub mod logging;
pub mod provider;
pub mod sampling;
pub mod session;
pub mod surface;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used items at crate root
pub use analyzer::{AnalysisUpdate, Analyzer, MuteGuard, RunPhase};
pub use capture::{FrameCapture, FrameRequest, JpegFrameCapture};
pub use config::{ConfigError, Settings, SettingsOverrides};
pub use describe::{DescriptionClient, FALLBACK_DESCRIPTION, VisionClient};
pub use error::{Result, ScribeError};
pub use format::{format_timestamp, format_transcript};
pub use logging::init_tracing;
pub use provider::{Provider, ProviderConfig};
pub use sampling::sample_timestamps;
pub use session::{
    RunState, Session, SurfaceHandle, TranscriptView, seek_and_play, toggle_playback,
};
pub use surface::{FfmpegSurface, PlaybackSurface};
pub use types::{EncodedFrame, Transcript, TranscriptEntry, VideoMetadata};
