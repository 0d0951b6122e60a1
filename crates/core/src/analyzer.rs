//! Frame sampling and sequential analysis.
//!
//! One run walks the sample timestamps strictly in order: seek, capture,
//! describe, append. Frames never overlap because they share the single
//! playback position of the surface.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    capture::{FrameCapture, FrameRequest, JpegFrameCapture},
    config::Settings,
    describe::{DescriptionClient, VisionClient},
    error::{Result, ScribeError},
    sampling::sample_timestamps,
    surface::PlaybackSurface,
    types::{Transcript, TranscriptEntry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    SeekingFrame,
    Capturing,
    Describing,
    Complete,
    Failed,
}

/// Progress of a run, streamed to the presentation layer in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisUpdate {
    Initializing,
    FrameStarted {
        index: usize,
        total: usize,
    },
    FrameDescribed {
        index: usize,
        total: usize,
        entry: TranscriptEntry,
    },
    Completed {
        frames: usize,
    },
    Failed {
        message: String,
    },
}

impl AnalysisUpdate {
    pub fn status(&self) -> String {
        match self {
            AnalysisUpdate::Initializing => "Initializing analysis...".to_string(),
            AnalysisUpdate::FrameStarted { index, total }
            | AnalysisUpdate::FrameDescribed { index, total, .. } => {
                format!("Analyzing frame {} of {}...", index + 1, total)
            }
            AnalysisUpdate::Completed { .. } => "Analysis complete!".to_string(),
            AnalysisUpdate::Failed { .. } => "Analysis failed.".to_string(),
        }
    }

    /// Percentage done after this update, if it moves the needle.
    pub fn progress(&self) -> Option<f64> {
        match self {
            AnalysisUpdate::Initializing => Some(0.0),
            AnalysisUpdate::FrameDescribed { index, total, .. } => {
                Some((*index + 1) as f64 / *total as f64 * 100.0)
            }
            AnalysisUpdate::Completed { .. } => Some(100.0),
            AnalysisUpdate::FrameStarted { .. } | AnalysisUpdate::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisUpdate::Completed { .. } | AnalysisUpdate::Failed { .. }
        )
    }
}

/// Forces a surface muted for as long as it lives and puts the original
/// muted state back when dropped, whichever way the run ends.
pub struct MuteGuard<'a, S: PlaybackSurface + ?Sized> {
    surface: &'a mut S,
    original: bool,
}

impl<'a, S: PlaybackSurface + ?Sized> MuteGuard<'a, S> {
    pub fn engage(surface: &'a mut S) -> Self {
        let original = surface.muted();
        surface.set_muted(true);
        Self { surface, original }
    }
}

impl<S: PlaybackSurface + ?Sized> Deref for MuteGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: PlaybackSurface + ?Sized> DerefMut for MuteGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: PlaybackSurface + ?Sized> Drop for MuteGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.set_muted(self.original);
    }
}

pub struct Analyzer<C, D> {
    capture: C,
    describer: D,
    interval: f64,
}

impl<C: FrameCapture, D: DescriptionClient> Analyzer<C, D> {
    pub fn new(capture: C, describer: D, interval: f64) -> Self {
        Self {
            capture,
            describer,
            interval,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Sample and describe the whole video, streaming every step to
    /// `updates`. The first failure ends the run; entries described before it
    /// have already been sent.
    pub async fn analyze_video<S: PlaybackSurface + ?Sized>(
        &self,
        surface: &mut S,
        updates: &UnboundedSender<AnalysisUpdate>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        emit(updates, AnalysisUpdate::Initializing);
        debug!(phase = ?RunPhase::Initializing, source = %surface.source().display());

        let result = {
            let mut surface = MuteGuard::engage(surface);
            self.run(&mut *surface, updates, cancel).await
        };

        match &result {
            Ok(transcript) => {
                info!(frames = transcript.len(), phase = ?RunPhase::Complete, "analysis finished");
                emit(
                    updates,
                    AnalysisUpdate::Completed {
                        frames: transcript.len(),
                    },
                );
            }
            Err(e) => {
                warn!(phase = ?RunPhase::Failed, "analysis failed: {e}");
                emit(
                    updates,
                    AnalysisUpdate::Failed {
                        message: e.to_string(),
                    },
                );
            }
        }

        result
    }

    async fn run<S: PlaybackSurface + ?Sized>(
        &self,
        surface: &mut S,
        updates: &UnboundedSender<AnalysisUpdate>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        ensure_active(cancel)?;
        // a running player would be restarted, muted, on every seek
        surface.pause();

        let metadata = match surface.metadata() {
            Some(metadata) => metadata,
            None => until_cancelled(cancel, surface.wait_for_metadata()).await?,
        };

        if !metadata.duration.is_finite() {
            return Err(ScribeError::UnboundedDuration);
        }

        let timestamps = sample_timestamps(metadata.duration, self.interval);
        if timestamps.is_empty() {
            return Err(ScribeError::UnsupportedSampling {
                duration: metadata.duration,
                interval: self.interval,
            });
        }
        let total = timestamps.len();
        info!(
            duration = metadata.duration,
            interval = self.interval,
            frames = total,
            "sampling video"
        );

        let mut transcript = Transcript::new();

        for (index, &timestamp) in timestamps.iter().enumerate() {
            emit(updates, AnalysisUpdate::FrameStarted { index, total });

            enter(RunPhase::SeekingFrame, index, timestamp);
            ensure_active(cancel)?;
            until_cancelled(cancel, surface.seek(timestamp)).await?;

            enter(RunPhase::Capturing, index, timestamp);
            ensure_active(cancel)?;
            let request = FrameRequest {
                source: surface.source(),
                position: timestamp,
                metadata,
            };
            let frame = until_cancelled(cancel, self.capture.capture(request)).await?;

            enter(RunPhase::Describing, index, timestamp);
            ensure_active(cancel)?;
            let description =
                until_cancelled(cancel, self.describer.describe_frame(&frame)).await?;

            let entry = TranscriptEntry {
                timestamp,
                description,
            };
            transcript.push(entry.clone());
            emit(
                updates,
                AnalysisUpdate::FrameDescribed {
                    index,
                    total,
                    entry,
                },
            );
        }

        Ok(transcript)
    }
}

impl Analyzer<JpegFrameCapture, VisionClient> {
    /// The production pipeline: ffmpeg frames described by the configured
    /// provider.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            JpegFrameCapture::new(settings.jpeg_quality),
            VisionClient::new(settings)?,
            settings.interval,
        ))
    }
}

fn emit(updates: &UnboundedSender<AnalysisUpdate>, update: AnalysisUpdate) {
    if updates.send(update).is_err() {
        debug!("update receiver dropped");
    }
}

fn enter(phase: RunPhase, index: usize, timestamp: f64) {
    debug!(?phase, index, timestamp);
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ScribeError::Cancelled);
    }
    Ok(())
}

/// Race a suspension point against cancellation. The losing future is
/// dropped, which tears down whatever it was waiting on.
async fn until_cancelled<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScribeError::Cancelled),
        result = future => result,
    }
}
