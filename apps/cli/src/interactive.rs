use anyhow::Result;
use console::{Term, style};
use scenescribe_core::{
    PlaybackSurface, Session, TranscriptEntry, format_timestamp, seek_and_play,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::info;

#[derive(Debug, PartialEq)]
enum Choice {
    Quit,
    Entry(usize),
    Invalid,
}

/// Accepts a 1-based entry number or an `MM:SS` label from the transcript.
fn parse_choice(input: &str, entries: &[TranscriptEntry]) -> Choice {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Choice::Quit;
    }

    if let Ok(number) = input.parse::<usize>() {
        return match number {
            n if (1..=entries.len()).contains(&n) => Choice::Entry(n - 1),
            _ => Choice::Invalid,
        };
    }

    entries
        .iter()
        .position(|entry| format_timestamp(entry.timestamp) == input)
        .map(Choice::Entry)
        .unwrap_or(Choice::Invalid)
}

/// Prompt on stdin and play the video from a chosen transcript entry until
/// the user quits, stdin closes or Ctrl-C is pressed.
pub async fn jump_to_entries<S: PlaybackSurface>(session: &Session<S>, term: &Term) -> Result<()> {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_loop(session, term, lines, tokio::signal::ctrl_c()).await
}

async fn prompt_loop<S, R, I>(
    session: &Session<S>,
    term: &Term,
    mut lines: Lines<R>,
    interrupt: I,
) -> Result<()>
where
    S: PlaybackSurface,
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    let entries = session.transcript().entries();
    if entries.is_empty() {
        return Ok(());
    }

    tokio::pin!(interrupt);
    loop {
        term.write_str(&format!(
            "\n{} ",
            style(format!("Jump to [1-{} or MM:SS, q to quit]:", entries.len())).dim()
        ))?;
        term.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut interrupt => {
                info!("interrupt received, leaving the prompt");
                term.write_line("")?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_choice(&line, entries) {
            Choice::Quit => break,
            Choice::Invalid => {
                term.write_line(&format!("{} no such entry", style("?").yellow().bold()))?
            }
            Choice::Entry(index) => {
                let Some((surface, timestamp)) = session.seek_target(index) else {
                    continue;
                };
                match seek_and_play(&surface, timestamp).await {
                    Ok(()) => term.write_line(&format!(
                        "{} Playing from {}",
                        style("▶").cyan().bold(),
                        format_timestamp(timestamp)
                    ))?,
                    Err(e) => eprintln!("{} {}", style("Error:").red().bold(), e),
                }
            }
        }
    }

    if let Some(surface) = session.surface() {
        surface.lock().await.pause();
    }
    Ok(())
}
