use serde::{Deserialize, Serialize};

/// One described frame of the analyzed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: f64,
    pub description: String,
}

/// Ordered sequence of entries produced by one analysis run.
///
/// Timestamps are strictly increasing; `push` refuses anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` (and drops the entry) when its
    /// timestamp does not come after the last one.
    pub fn push(&mut self, entry: TranscriptEntry) -> bool {
        if let Some(last) = self.entries.last()
            && entry.timestamp <= last.timestamp
        {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TranscriptEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// A captured frame, ready to be attached to a remote request.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub timestamp: f64,
    pub mime_type: &'static str,
    /// Base64 payload without a data URI prefix
    pub data: String,
}
