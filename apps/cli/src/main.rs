use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use scenescribe_core::{
    AnalysisUpdate, Analyzer, FfmpegSurface, Provider, Session, Settings, SettingsOverrides,
    format_timestamp, format_transcript, init_tracing,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod interactive;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Gemini,
    Openai,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Gemini => Provider::Gemini,
            CliProvider::Openai => Provider::Openai,
        }
    }
}

#[derive(Parser)]
#[command(name = "scenescribe")]
#[command(about = "Sample frames from a local video and describe every scene with a vision model")]
struct Cli {
    /// Video file to analyze
    video: PathBuf,

    /// AI provider for frame descriptions
    #[arg(short, long, default_value = "gemini")]
    provider: CliProvider,

    /// Vision model name. Defaults to the provider's model.
    #[arg(short, long)]
    model: Option<String>,

    /// Seconds between sampled frames
    #[arg(short, long)]
    interval: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print the transcript as JSON
    #[arg(long)]
    json: bool,

    /// After the run, jump to transcript entries in the player
    #[arg(long)]
    interactive: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Where headers and step lines go. `--json` keeps stdout for the
    /// document alone.
    fn status_term(&self) -> Term {
        if self.json {
            Term::stderr()
        } else {
            Term::stdout()
        }
    }

    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            model: self.model.clone(),
            interval: self.interval,
            request_timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")?
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let provider: Provider = cli.provider.into();

    // Validate configuration early
    let settings = match Settings::from_env(provider, cli.overrides()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    debug!(?settings, "configuration loaded");

    let term = cli.status_term();
    term.write_line(&format!(
        "\n{}  {}\n",
        style("scenescribe").cyan().bold(),
        style("Video Scene Analyzer").dim()
    ))?;

    let surface = match FfmpegSurface::open(&cli.video) {
        Ok(surface) => surface,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    term.write_line(&format!(
        "{} Loaded {}",
        style("✓").green().bold(),
        style(surface.file_name()).dim()
    ))?;

    let mut session = Session::new();
    session.load_video(surface)?;

    let analyzer = Analyzer::from_settings(&settings)?;
    term.write_line(&format!(
        "{} Describing a frame every {}s with {} ({})",
        style("✓").green().bold(),
        analyzer.interval(),
        provider.name(),
        style(&settings.model).dim()
    ))?;
    term.write_line(&style("─".repeat(60)).dim().to_string())?;

    let handle = session.begin_run()?;
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Ctrl-C stops the run after the step in flight
    let interrupt = cancel.clone();
    let interrupt_listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling analysis");
            interrupt.cancel();
        }
    });

    let total_start = Instant::now();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut surface = handle.lock().await;
            analyzer.analyze_video(&mut *surface, &tx, &cancel).await
        }
    });

    let pb = create_progress_bar()?;
    pb.set_message(session.run().status.clone());
    while let Some(update) = rx.recv().await {
        session.apply(&update);
        pb.set_position(session.run().progress.round() as u64);
        pb.set_message(session.run().status.clone());

        if let AnalysisUpdate::FrameDescribed { entry, .. } = &update {
            pb.println(format!(
                "{} {}",
                style(format!("[{}]", format_timestamp(entry.timestamp))).cyan(),
                entry.description.trim()
            ));
        }
    }

    let outcome = run.await?;
    interrupt_listener.abort();
    session.finish_run(outcome.map_err(|e| e.to_string()));

    if let Some(message) = session.error().map(str::to_string) {
        pb.abandon_with_message(format!(
            "{} {}",
            style("✗").red().bold(),
            session.run().status
        ));
        eprintln!("\n{} {}", style("Error:").red().bold(), message);
        drop(session);
        std::process::exit(1);
    }

    pb.finish_with_message(format!(
        "{} {} {}",
        style("✓").green().bold(),
        session.run().status,
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    ));

    term.write_line(&format!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    ))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(session.transcript())?);
    } else {
        println!("{}", style("Scene Transcript").bold());
        println!("{}", style("─".repeat(60)).dim());
        println!("{}", format_transcript(session.transcript()));
    }

    if cli.interactive {
        interactive::jump_to_entries(&session, &term).await?;
    }

    Ok(())
}
