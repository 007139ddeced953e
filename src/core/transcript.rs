//! Modem dialogue transcript
//!
//! Append-only record of every line sent to and received from the modem,
//! kept for diagnostics when a run fails.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Data direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Written to the modem
    Outgoing,
    /// Read from the modem
    Incoming,
}

impl Direction {
    /// Prefix used in text renderings
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Outgoing => ">",
            Direction::Incoming => "<",
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// When the line was sent or heard
    pub timestamp: DateTime<Local>,
    /// Which way the line went
    pub direction: Direction,
    /// Line without its terminator
    pub text: String,
}

impl TranscriptEntry {
    /// Create new entry stamped with the current time
    pub fn new(direction: Direction, text: &str) -> Self {
        Self::at(direction, text, Local::now())
    }

    /// Create entry with an explicit timestamp
    pub fn at(direction: Direction, text: &str, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            direction,
            text: text.to_string(),
        }
    }

    /// Format as text, control characters in caret notation
    pub fn to_text(&self, show_timestamp: bool) -> String {
        let text = printable(&self.text);

        if show_timestamp {
            format!(
                "[{}] {} {}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                self.direction.marker(),
                text
            )
        } else {
            format!("{} {}", self.direction.marker(), text)
        }
    }
}

/// Render control characters as `^X` so ESC and Ctrl-Z stay visible
pub fn printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\x00'..='\x1f' => {
                out.push('^');
                out.push(char::from(c as u8 + b'@'));
            }
            '\x7f' => out.push_str("^?"),
            _ => out.push(c),
        }
    }
    out
}

/// Ordered, append-only transcript
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Record a line sent to the modem
    pub fn log_outgoing(&mut self, text: &str) {
        self.push(TranscriptEntry::new(Direction::Outgoing, text));
    }

    /// Record a line received from the modem
    pub fn log_incoming(&mut self, text: &str) {
        self.push(TranscriptEntry::new(Direction::Incoming, text));
    }

    /// All entries in order
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Iterate entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, TranscriptEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was exchanged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries in one direction
    pub fn count(&self, direction: Direction) -> usize {
        self.entries.iter().filter(|e| e.direction == direction).count()
    }

    /// Export as text, one entry per line
    pub fn export(&self, show_timestamps: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            result.push_str(&entry.to_text(show_timestamps));
            result.push('\n');
        }
        result
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a TranscriptEntry;
    type IntoIter = std::slice::Iter<'a, TranscriptEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_text() {
        let entry = TranscriptEntry::new(Direction::Outgoing, "AT");
        assert_eq!(entry.to_text(false), "> AT");

        let entry = TranscriptEntry::new(Direction::Incoming, "OK");
        assert_eq!(entry.to_text(false), "< OK");
        assert!(entry.to_text(true).ends_with("< OK"));
    }

    #[test]
    fn test_control_characters_are_visible() {
        assert_eq!(printable("\x1b"), "^[");
        assert_eq!(printable("Hi\x1a"), "Hi^Z");
        assert_eq!(printable("zażółć"), "zażółć");
    }

    #[test]
    fn test_transcript_keeps_order() {
        let mut transcript = Transcript::new();
        transcript.log_outgoing("AT");
        transcript.log_incoming("OK");
        transcript.log_outgoing("AT+CMGF=1");

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.count(Direction::Outgoing), 2);
        assert_eq!(transcript.count(Direction::Incoming), 1);
        assert_eq!(transcript.export(false), "> AT\n< OK\n> AT+CMGF=1\n");
    }

    #[test]
    fn test_transcript_json() {
        let mut transcript = Transcript::new();
        transcript.log_outgoing("AT");
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(json[0]["direction"], "outgoing");
        assert_eq!(json[0]["text"], "AT");
    }
}
