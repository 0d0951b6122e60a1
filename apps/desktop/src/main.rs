use std::time::Duration;

use iced::widget::{
    Column, button, column, container, progress_bar, row, scrollable, text, text_input,
};
use iced::{Color, Element, Length, Subscription, Task, time};
use scenescribe_core::{
    AnalysisUpdate, Analyzer, FfmpegSurface, PlaybackSurface, Provider, Session, Settings,
    SettingsOverrides, Transcript, TranscriptEntry, TranscriptView, VideoMetadata,
    format_timestamp, init_tracing, seek_and_play, toggle_playback,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SKELETON_ROWS: usize = 4;
const POSITION_REFRESH: Duration = Duration::from_millis(500);

fn main() -> iced::Result {
    init_tracing(0);

    // Validate configuration before opening a window
    let settings = match Settings::from_env(Provider::default(), SettingsOverrides::default()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    iced::application(move || App::new(settings.clone()), App::update, App::view)
        .title("Scenescribe")
        .subscription(App::subscription)
        .run()
}

struct LoadedVideo {
    name: String,
    metadata: Option<VideoMetadata>,
}

struct App {
    settings: Settings,
    session: Session<FfmpegSurface>,
    path: String,
    video: Option<LoadedVideo>,
    position: f64,
    playing: bool,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
enum Message {
    PathChanged(String),
    LoadVideo,
    MetadataLoaded(Result<VideoMetadata, String>),
    Analyze,
    Cancel,
    Update(AnalysisUpdate),
    RunFinished(Result<Transcript, String>),
    EntryClicked(usize),
    Played(Result<(), String>),
    TogglePlayback,
    PlaybackToggled(Result<bool, String>),
    Tick,
}

impl App {
    fn new(settings: Settings) -> (Self, Task<Message>) {
        (
            Self {
                settings,
                session: Session::new(),
                path: String::new(),
                video: None,
                position: 0.0,
                playing: false,
                cancel: None,
            },
            Task::none(),
        )
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PathChanged(path) => self.path = path,
            Message::LoadVideo => return self.load_video(),
            Message::MetadataLoaded(Ok(metadata)) => {
                if let Some(video) = &mut self.video {
                    video.metadata = Some(metadata);
                }
            }
            Message::MetadataLoaded(Err(message)) => self.session.set_error(message),
            Message::Analyze => return self.start_analysis(),
            Message::Cancel => {
                if let Some(cancel) = &self.cancel {
                    info!("cancelling analysis");
                    cancel.cancel();
                }
            }
            Message::Update(update) => self.session.apply(&update),
            Message::RunFinished(outcome) => {
                self.cancel = None;
                self.session.finish_run(outcome);
            }
            Message::EntryClicked(index) => {
                if let Some((surface, timestamp)) = self.session.seek_target(index) {
                    return Task::perform(
                        async move {
                            seek_and_play(&surface, timestamp)
                                .await
                                .map_err(|e| e.to_string())
                        },
                        Message::Played,
                    );
                }
            }
            Message::Played(Ok(())) => self.playing = true,
            Message::Played(Err(message)) => self.session.set_error(message),
            Message::TogglePlayback => {
                if self.session.run().in_progress {
                    return Task::none();
                }
                if let Some(surface) = self.session.surface() {
                    return Task::perform(
                        async move { toggle_playback(&surface).await.map_err(|e| e.to_string()) },
                        Message::PlaybackToggled,
                    );
                }
            }
            Message::PlaybackToggled(Ok(playing)) => self.playing = playing,
            Message::PlaybackToggled(Err(message)) => self.session.set_error(message),
            Message::Tick => {
                if let Some(surface) = self.session.surface()
                    && let Ok(mut surface) = surface.try_lock()
                {
                    self.position = surface.position();
                    self.playing = surface.is_playing();
                }
            }
        }
        Task::none()
    }

    fn load_video(&mut self) -> Task<Message> {
        if !self.session.can_select_file() {
            return Task::none();
        }

        let path = self.path.trim();
        if path.is_empty() {
            return Task::none();
        }

        let surface = match FfmpegSurface::open(path) {
            Ok(surface) => surface,
            Err(e) => {
                self.session.set_error(e.to_string());
                return Task::none();
            }
        };
        let name = surface.file_name();
        if let Err(e) = self.session.load_video(surface) {
            self.session.set_error(e.to_string());
            return Task::none();
        }

        info!("loaded {name}");
        self.video = Some(LoadedVideo {
            name,
            metadata: None,
        });
        self.position = 0.0;
        self.playing = false;

        let Some(surface) = self.session.surface() else {
            return Task::none();
        };
        Task::perform(
            async move {
                surface
                    .lock()
                    .await
                    .wait_for_metadata()
                    .await
                    .map_err(|e| e.to_string())
            },
            Message::MetadataLoaded,
        )
    }

    fn start_analysis(&mut self) -> Task<Message> {
        if !self.session.can_analyze() {
            return Task::none();
        }

        let analyzer = match Analyzer::from_settings(&self.settings) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                self.session.set_error(e.to_string());
                return Task::none();
            }
        };
        let surface = match self.session.begin_run() {
            Ok(surface) => surface,
            Err(e) => {
                self.session.set_error(e.to_string());
                return Task::none();
            }
        };

        // the run pauses playback before sampling
        self.playing = false;
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        let run = Task::perform(
            async move {
                let mut surface = surface.lock().await;
                analyzer
                    .analyze_video(&mut *surface, &tx, &cancel)
                    .await
                    .map_err(|e| e.to_string())
            },
            Message::RunFinished,
        );
        let updates = Task::run(UnboundedReceiverStream::new(rx), Message::Update);

        Task::batch([updates, run])
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.session.has_video() {
            time::every(POSITION_REFRESH).map(|_| Message::Tick)
        } else {
            Subscription::none()
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let can_select = self.session.can_select_file();
        let loader = row![
            text_input("Path to a video file...", &self.path)
                .on_input(Message::PathChanged)
                .on_submit(Message::LoadVideo),
            button("Load video").on_press_maybe(can_select.then_some(Message::LoadVideo)),
        ]
        .spacing(10);

        let in_progress = self.session.run().in_progress;
        let analyze = button(if in_progress {
            "Analyzing..."
        } else {
            "Analyze Video"
        })
        .on_press_maybe(self.session.can_analyze().then_some(Message::Analyze));

        let mut controls = row![analyze].spacing(10);
        if in_progress {
            controls = controls.push(button("Cancel").on_press(Message::Cancel));
        }

        let mut content = column![text("Scenescribe").size(24), loader, self.video_panel(), controls]
            .spacing(12)
            .padding(20);

        if self.session.progress_visible() {
            let run = self.session.run();
            content = content
                .push(progress_bar(0.0..=100.0, run.progress as f32))
                .push(text(run.status.as_str()).size(14));
        }

        if let Some(error) = self.session.error() {
            content = content.push(text(error).color(Color::from_rgb(0.85, 0.2, 0.2)));
        }

        content
            .push(text("Scene Transcript").size(20))
            .push(scrollable(self.transcript_panel()).height(Length::Fill))
            .into()
    }

    fn video_panel(&self) -> Element<'_, Message> {
        let Some(video) = &self.video else {
            return text("No video selected").into();
        };

        let duration = match video.metadata {
            Some(metadata) if metadata.duration.is_finite() => format_timestamp(metadata.duration),
            Some(_) => "live".to_string(),
            None => "--:--".to_string(),
        };

        let can_toggle = !self.session.run().in_progress;
        let playback = button(if self.playing { "Pause" } else { "Play" })
            .on_press_maybe(can_toggle.then_some(Message::TogglePlayback));

        container(
            column![
                text(video.name.as_str()).size(18),
                row![
                    playback,
                    text(format!(
                        "{} / {}",
                        format_timestamp(self.position),
                        duration
                    ))
                    .size(14),
                ]
                .spacing(10),
            ]
            .spacing(4),
        )
        .padding(10)
        .into()
    }

    fn transcript_panel(&self) -> Element<'_, Message> {
        match self.session.transcript_view() {
            TranscriptView::AwaitingAnalysis => column![
                text("Awaiting Analysis").size(16),
                text("Load a video and press Analyze Video to describe its scenes.").size(14),
            ]
            .spacing(4)
            .into(),
            TranscriptView::Skeleton => Column::with_children(
                (0..SKELETON_ROWS).map(|_| skeleton_row()),
            )
            .spacing(8)
            .into(),
            TranscriptView::Entries { entries, pending } => {
                let rows = Column::with_children(
                    entries
                        .iter()
                        .enumerate()
                        .map(|(index, entry)| entry_row(index, entry, !pending)),
                )
                .spacing(8);

                if pending {
                    rows.push(skeleton_row()).into()
                } else {
                    rows.into()
                }
            }
        }
    }
}

fn entry_row(index: usize, entry: &TranscriptEntry, playable: bool) -> Element<'_, Message> {
    row![
        button(text(format!("▶ {}", format_timestamp(entry.timestamp))))
            .on_press_maybe(playable.then_some(Message::EntryClicked(index))),
        text(entry.description.as_str()).width(Length::Fill),
    ]
    .spacing(10)
    .into()
}

fn skeleton_row<'a>() -> Element<'a, Message> {
    text("░░░░░  ░░░░░░░░░░░░░░░░░░░░░░░░")
        .color(Color::from_rgb(0.6, 0.6, 0.6))
        .into()
}
