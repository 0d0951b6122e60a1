//! Playback surfaces.
//!
//! A surface is the one shared piece of mutable state in the system: a
//! playback position, a muted flag and a player. The orchestrator drives it
//! during a run; the user drives it (click to seek) outside a run.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ScribeError},
    types::VideoMetadata,
};

/// Player volume, in percent, used when playback is resumed.
const PLAYBACK_VOLUME: u8 = 50;

#[async_trait]
pub trait PlaybackSurface: Send {
    /// Path of the file backing the surface.
    fn source(&self) -> &Path;

    /// Metadata if it has already been loaded.
    fn metadata(&self) -> Option<VideoMetadata>;

    /// Resolves once metadata is available, loading it if needed.
    async fn wait_for_metadata(&mut self) -> Result<VideoMetadata>;

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Move to `position` and resolve once the seek has completed.
    async fn seek(&mut self, position: f64) -> Result<()>;

    fn muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Start (or restart) playback from the current position.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_playing(&mut self) -> bool;

    /// Give up every resource held by the surface. The surface is unusable
    /// for playback afterwards.
    fn release(&mut self);
}

/// Surface backed by the ffmpeg tool suite: `ffprobe` loads metadata and
/// `ffplay` plays the file from the current position.
pub struct FfmpegSurface {
    source: PathBuf,
    metadata: Option<VideoMetadata>,
    position: f64,
    muted: bool,
    player: Option<Child>,
    playing_since: Option<Instant>,
    released: bool,
}

impl FfmpegSurface {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let source = path.into();
        if !source.is_file() {
            return Err(ScribeError::SourceUnavailable { path: source });
        }

        Ok(Self {
            source,
            metadata: None,
            position: 0.0,
            muted: false,
            player: None,
            playing_since: None,
            released: false,
        })
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    fn spawn_player(&self) -> Result<Child> {
        let mut command = Command::new("ffplay");
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-autoexit")
            .arg("-ss")
            .arg(format!("{:.3}", self.position))
            .arg("-volume")
            .arg(PLAYBACK_VOLUME.to_string());

        if self.muted {
            command.arg("-an");
        }

        command
            .arg(&self.source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScribeError::Playback {
                reason: format!("could not start ffplay: {e}"),
            })
    }

    fn stop_player(&mut self) {
        if let Some(mut player) = self.player.take() {
            if let Err(e) = player.start_kill() {
                debug!("player already gone: {e}");
            }
        }
        self.playing_since = None;
    }
}

#[async_trait]
impl PlaybackSurface for FfmpegSurface {
    fn source(&self) -> &Path {
        &self.source
    }

    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
    }

    async fn wait_for_metadata(&mut self) -> Result<VideoMetadata> {
        if let Some(metadata) = self.metadata {
            return Ok(metadata);
        }

        let metadata = probe(&self.source).await?;
        info!(
            duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            "loaded metadata for {}",
            self.source.display()
        );
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let position = self.position + elapsed;

        match self.metadata {
            Some(metadata) if metadata.duration.is_finite() => position.min(metadata.duration),
            _ => position,
        }
    }

    async fn seek(&mut self, position: f64) -> Result<()> {
        if self.released {
            return Err(ScribeError::Playback {
                reason: "video has been released".to_string(),
            });
        }

        let metadata = self.wait_for_metadata().await?;
        if !position.is_finite() || position < 0.0 || position > metadata.duration {
            return Err(ScribeError::Playback {
                reason: format!(
                    "cannot seek to {position}s in a {:.2}s video",
                    metadata.duration
                ),
            });
        }

        let was_playing = self.is_playing();
        self.stop_player();
        self.position = position;

        if was_playing {
            self.play()?;
        }

        debug!(position, "seeked");
        Ok(())
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn play(&mut self) -> Result<()> {
        if self.released {
            return Err(ScribeError::Playback {
                reason: "video has been released".to_string(),
            });
        }

        self.stop_player();
        self.player = Some(self.spawn_player()?);
        self.playing_since = Some(Instant::now());
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing_since.is_some() {
            self.position = self.position();
        }
        self.stop_player();
    }

    fn is_playing(&mut self) -> bool {
        let running = match self.player.as_mut().map(|player| player.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) => false,
            Some(Err(e)) => {
                warn!("could not poll player: {e}");
                false
            }
            None => false,
        };

        if !running && self.player.is_some() {
            // ffplay exited on its own (end of file or window closed)
            self.pause();
        }
        running
    }

    fn release(&mut self) {
        self.stop_player();
        self.released = true;
    }
}

impl Drop for FfmpegSurface {
    fn drop(&mut self) {
        self.stop_player();
    }
}

/// Read duration and picture size with `ffprobe`.
async fn probe(source: &Path) -> Result<VideoMetadata> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height:format=duration")
        .arg("-of")
        .arg("json")
        .arg(source)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ScribeError::Playback {
            reason: format!("could not run ffprobe: {e}"),
        })?;

    if !output.status.success() {
        return Err(ScribeError::Playback {
            reason: format!(
                "could not read video metadata from {}: {}",
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output. A missing or unparsable duration (live
/// and streamed sources) is reported as infinite.
pub fn parse_probe_output(json: &str) -> Result<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ScribeError::Playback {
            reason: "file has no video stream".to_string(),
        })?;

    let duration = probe
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .unwrap_or(f64::INFINITY);

    Ok(VideoMetadata {
        duration,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}
