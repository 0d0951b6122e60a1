use crate::types::Transcript;

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{:02}:{:02}", mins, secs)
}

/// Format transcript entries with timestamps
pub fn format_transcript(transcript: &Transcript) -> String {
    transcript
        .entries()
        .iter()
        .map(|entry| {
            format!(
                "[{}] {}",
                format_timestamp(entry.timestamp),
                entry.description.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
