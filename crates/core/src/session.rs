//! View state shared by the front ends.
//!
//! A session owns the loaded video surface, the transcript and the state of
//! the current run. It never blocks: front ends run the analysis and the
//! seeks themselves and feed the outcome back in.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    analyzer::AnalysisUpdate,
    error::{Result, ScribeError},
    surface::PlaybackSurface,
    types::{Transcript, TranscriptEntry},
};

/// Shared access to the single playback surface. Whoever holds the lock
/// owns the playback position.
pub type SurfaceHandle<S> = Arc<Mutex<S>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub in_progress: bool,
    pub progress: f64,
    pub status: String,
}

/// What the transcript panel should show.
#[derive(Debug, PartialEq)]
pub enum TranscriptView<'a> {
    AwaitingAnalysis,
    Skeleton,
    Entries {
        entries: &'a [TranscriptEntry],
        /// A run is still adding entries.
        pending: bool,
    },
}

pub struct Session<S: PlaybackSurface> {
    surface: Option<SurfaceHandle<S>>,
    transcript: Transcript,
    run: RunState,
    error: Option<String>,
    /// The run was closed by a failed outcome before its own terminal
    /// update; entries it already described are still on their way.
    draining: bool,
}

impl<S: PlaybackSurface> Default for Session<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PlaybackSurface> Session<S> {
    pub fn new() -> Self {
        Self {
            surface: None,
            transcript: Transcript::new(),
            run: RunState::default(),
            error: None,
            draining: false,
        }
    }

    /// Replace the current video. The previous surface is released first
    /// and every result that belonged to it is cleared.
    pub fn load_video(&mut self, surface: S) -> Result<()> {
        if self.run.in_progress {
            return Err(ScribeError::RunInProgress);
        }

        self.release_current();
        self.surface = Some(Arc::new(Mutex::new(surface)));
        self.transcript.clear();
        self.error = None;
        self.run = RunState::default();
        self.draining = false;
        Ok(())
    }

    /// Mark a run as started and hand out the surface for it.
    pub fn begin_run(&mut self) -> Result<SurfaceHandle<S>> {
        if self.run.in_progress {
            return Err(ScribeError::RunInProgress);
        }
        let surface = self.surface.clone().ok_or(ScribeError::NoVideoLoaded)?;

        self.transcript.clear();
        self.error = None;
        self.draining = false;
        self.run = RunState {
            in_progress: true,
            progress: 0.0,
            status: AnalysisUpdate::Initializing.status(),
        };
        Ok(surface)
    }

    /// Fold one update of the active run into the view state.
    pub fn apply(&mut self, update: &AnalysisUpdate) {
        if !self.run.in_progress {
            self.drain(update);
            return;
        }

        if let AnalysisUpdate::FrameDescribed { entry, .. } = update
            && !self.transcript.push(entry.clone())
        {
            warn!(timestamp = entry.timestamp, "dropping out-of-order entry");
        }

        if let Some(progress) = update.progress() {
            self.run.progress = progress;
        }
        self.run.status = update.status();

        match update {
            AnalysisUpdate::Completed { .. } => self.run.in_progress = false,
            AnalysisUpdate::Failed { message } => {
                self.run.in_progress = false;
                self.error = Some(message.clone());
            }
            _ => {}
        }
    }

    /// Close the run with its final outcome. Safe to call after a terminal
    /// update has already been applied.
    pub fn finish_run(&mut self, outcome: std::result::Result<Transcript, String>) {
        match outcome {
            Ok(transcript) => {
                if self.run.in_progress {
                    self.apply(&AnalysisUpdate::Completed {
                        frames: transcript.len(),
                    });
                }
                self.transcript = transcript;
            }
            Err(message) => {
                if self.run.in_progress {
                    self.apply(&AnalysisUpdate::Failed { message });
                    self.draining = true;
                }
            }
        }
    }

    /// Keep entries a failed run described before its outcome arrived, up to
    /// that run's own terminal update.
    fn drain(&mut self, update: &AnalysisUpdate) {
        if !self.draining {
            debug!(?update, "ignoring update outside of a run");
            return;
        }

        match update {
            AnalysisUpdate::FrameDescribed { entry, .. } => {
                if !self.transcript.push(entry.clone()) {
                    warn!(timestamp = entry.timestamp, "dropping out-of-order entry");
                }
            }
            update if update.is_terminal() => self.draining = false,
            _ => {}
        }
    }

    /// Surface and exact timestamp to jump to when an entry is clicked.
    /// Unavailable while a run owns the surface.
    pub fn seek_target(&self, index: usize) -> Option<(SurfaceHandle<S>, f64)> {
        if self.run.in_progress {
            return None;
        }
        let entry = self.transcript.get(index)?;
        let surface = self.surface.clone()?;
        Some((surface, entry.timestamp))
    }

    pub fn surface(&self) -> Option<SurfaceHandle<S>> {
        self.surface.clone()
    }

    pub fn has_video(&self) -> bool {
        self.surface.is_some()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn can_select_file(&self) -> bool {
        !self.run.in_progress
    }

    pub fn can_analyze(&self) -> bool {
        self.has_video() && !self.run.in_progress
    }

    pub fn progress_visible(&self) -> bool {
        self.run.in_progress
    }

    pub fn transcript_view(&self) -> TranscriptView<'_> {
        match (self.run.in_progress, self.transcript.is_empty()) {
            (false, true) => TranscriptView::AwaitingAnalysis,
            (true, true) => TranscriptView::Skeleton,
            (pending, false) => TranscriptView::Entries {
                entries: self.transcript.entries(),
                pending,
            },
        }
    }

    fn release_current(&mut self) {
        let Some(handle) = self.surface.take() else {
            return;
        };

        match handle.try_lock() {
            Ok(mut surface) => surface.release(),
            // a seek still holds it; the surface is released when that
            // task drops its handle
            Err(_) => warn!("surface busy while being replaced"),
        }
    }
}

impl<S: PlaybackSurface> Drop for Session<S> {
    fn drop(&mut self) {
        self.release_current();
    }
}

/// Jump to `timestamp` and resume playback from there.
pub async fn seek_and_play<S: PlaybackSurface>(
    surface: &SurfaceHandle<S>,
    timestamp: f64,
) -> Result<()> {
    let mut surface = surface.lock().await;
    surface.seek(timestamp).await?;
    surface.play()
}

/// Pause a playing surface or resume a paused one. Returns whether it is
/// playing afterwards.
pub async fn toggle_playback<S: PlaybackSurface>(surface: &SurfaceHandle<S>) -> Result<bool> {
    let mut surface = surface.lock().await;
    if surface.is_playing() {
        surface.pause();
        Ok(false)
    } else {
        surface.play()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        analyzer::Analyzer,
        testing::{EchoDescriber, FakeCapture, FakeSurface},
    };

    fn entry(timestamp: f64) -> TranscriptEntry {
        TranscriptEntry {
            timestamp,
            description: format!("scene {timestamp}"),
        }
    }

    fn described(index: usize, total: usize, timestamp: f64) -> AnalysisUpdate {
        AnalysisUpdate::FrameDescribed {
            index,
            total,
            entry: entry(timestamp),
        }
    }

    #[test]
    fn starts_awaiting_a_video() {
        let session: Session<FakeSurface> = Session::new();
        assert!(!session.can_analyze());
        assert!(session.can_select_file());
        assert!(!session.progress_visible());
        assert_eq!(session.transcript_view(), TranscriptView::AwaitingAnalysis);
        assert!(matches!(
            Session::<FakeSurface>::new().begin_run(),
            Err(ScribeError::NoVideoLoaded)
        ));
    }

    #[test]
    fn run_lifecycle_drives_the_view() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(10.0)).unwrap();

        session.begin_run().unwrap();
        assert!(session.progress_visible());
        assert!(!session.can_select_file());
        assert!(!session.can_analyze());
        assert_eq!(session.run().status, "Initializing analysis...");
        assert_eq!(session.transcript_view(), TranscriptView::Skeleton);

        session.apply(&AnalysisUpdate::FrameStarted { index: 0, total: 3 });
        session.apply(&described(0, 3, 0.0));
        assert!(matches!(
            session.transcript_view(),
            TranscriptView::Entries { pending: true, .. }
        ));
        assert_eq!(session.run().status, "Analyzing frame 1 of 3...");

        session.apply(&described(1, 3, 5.0));
        session.apply(&described(2, 3, 10.0));
        session.apply(&AnalysisUpdate::Completed { frames: 3 });

        assert!(!session.progress_visible());
        assert_eq!(session.run().progress, 100.0);
        assert_eq!(session.run().status, "Analysis complete!");
        assert_eq!(session.transcript().len(), 3);
        assert!(matches!(
            session.transcript_view(),
            TranscriptView::Entries { pending: false, entries } if entries.len() == 3
        ));
    }

    #[test]
    fn failure_keeps_entries_and_shows_the_error() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(10.0)).unwrap();
        session.begin_run().unwrap();

        session.apply(&described(0, 3, 0.0));
        session.apply(&AnalysisUpdate::Failed {
            message: "network down".to_string(),
        });

        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.error(), Some("network down"));
        assert_eq!(session.run().status, "Analysis failed.");
        assert!(session.can_analyze());
    }

    #[test]
    fn finish_run_is_idempotent() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(5.0)).unwrap();
        session.begin_run().unwrap();
        session.apply(&AnalysisUpdate::Failed {
            message: "first".to_string(),
        });
        session.finish_run(Err("second".to_string()));
        assert_eq!(session.error(), Some("first"));

        session.begin_run().unwrap();
        let mut transcript = Transcript::new();
        transcript.push(entry(0.0));
        transcript.push(entry(5.0));
        session.finish_run(Ok(transcript));
        assert!(!session.run().in_progress);
        assert_eq!(session.transcript().len(), 2);

        // a late update from the finished run changes nothing
        session.apply(&described(1, 2, 5.0));
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn failed_outcome_before_queued_updates_keeps_their_entries() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(15.0)).unwrap();
        session.begin_run().unwrap();
        session.apply(&described(0, 4, 0.0));

        session.finish_run(Err("service unavailable".to_string()));
        assert!(!session.run().in_progress);
        assert_eq!(session.run().status, "Analysis failed.");

        // the update stream catches up after the outcome
        session.apply(&described(1, 4, 5.0));
        session.apply(&AnalysisUpdate::FrameStarted { index: 2, total: 4 });
        session.apply(&AnalysisUpdate::Failed {
            message: "service unavailable".to_string(),
        });

        let stamps: Vec<f64> = session.transcript().entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 5.0]);
        assert_eq!(session.error(), Some("service unavailable"));
        assert_eq!(session.run().status, "Analysis failed.");
        assert!(session.can_analyze());

        // nothing after the run's own terminal update is kept
        session.apply(&described(2, 4, 10.0));
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn loading_a_video_clears_results_and_releases_the_previous_one() {
        let first = FakeSurface::with_duration(10.0);
        let first_releases = first.release_count();
        let second = FakeSurface::with_duration(10.0);
        let second_releases = second.release_count();

        let mut session = Session::new();
        session.load_video(first).unwrap();
        session.begin_run().unwrap();
        session.apply(&described(0, 1, 0.0));
        session.apply(&AnalysisUpdate::Completed { frames: 1 });
        assert_eq!(session.transcript().len(), 1);

        session.load_video(second).unwrap();
        assert_eq!(first_releases.load(Ordering::SeqCst), 1);
        assert_eq!(second_releases.load(Ordering::SeqCst), 0);
        assert!(session.transcript().is_empty());
        assert_eq!(session.run().progress, 0.0);

        drop(session);
        assert_eq!(second_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_selection_is_locked_during_a_run() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(10.0)).unwrap();
        session.begin_run().unwrap();

        assert!(matches!(
            session.load_video(FakeSurface::with_duration(3.0)),
            Err(ScribeError::RunInProgress)
        ));
        assert!(matches!(session.begin_run(), Err(ScribeError::RunInProgress)));
        assert!(session.seek_target(0).is_none());
    }

    #[tokio::test]
    async fn clicking_an_entry_seeks_and_resumes_playback() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(12.0)).unwrap();
        session.begin_run().unwrap();
        session.apply(&described(0, 3, 0.0));
        session.apply(&described(1, 3, 5.0));
        session.apply(&described(2, 3, 10.0));
        session.apply(&AnalysisUpdate::Completed { frames: 3 });

        let (surface, timestamp) = session.seek_target(2).unwrap();
        assert_eq!(timestamp, 10.0);
        seek_and_play(&surface, timestamp).await.unwrap();

        let surface = surface.lock().await;
        assert_eq!(surface.position, 10.0);
        assert!(surface.playing);
        assert!(session.seek_target(3).is_none());
    }

    #[tokio::test]
    async fn toggling_alternates_play_and_pause() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(12.0)).unwrap();
        let surface = session.surface().unwrap();

        assert!(toggle_playback(&surface).await.unwrap());
        assert!(surface.lock().await.playing);

        assert!(!toggle_playback(&surface).await.unwrap());
        assert!(!surface.lock().await.playing);
    }

    #[tokio::test]
    async fn session_accumulates_a_real_run() {
        let mut session = Session::new();
        session.load_video(FakeSurface::with_duration(12.0)).unwrap();
        let handle = session.begin_run().unwrap();

        let analyzer = Analyzer::new(FakeCapture::default(), EchoDescriber::default(), 5.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = {
            let mut surface = handle.lock().await;
            analyzer
                .analyze_video(&mut *surface, &tx, &CancellationToken::new())
                .await
        };

        while let Ok(update) = rx.try_recv() {
            session.apply(&update);
        }
        session.finish_run(outcome.map_err(|e| e.to_string()));

        let stamps: Vec<f64> = session
            .transcript()
            .entries()
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(stamps, vec![0.0, 5.0, 10.0]);
        assert!(!session.run().in_progress);
        assert!(session.error().is_none());
    }
}
