use serde::{Deserialize, Serialize};

/// One entry in the bounded history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Node that produced the entry.
    pub producer: String,
    pub text: String,
}

impl HistoryEntry {
    pub fn new(producer: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            text: text.into(),
        }
    }
}

/// Append an entry, keeping only the last `window` entries.
///
/// A sliding window, not a summary: oldest entries drop first.
pub fn append(history: &[HistoryEntry], entry: HistoryEntry, window: usize) -> Vec<HistoryEntry> {
    let mut out = history.to_vec();
    out.push(entry);
    truncate(out, window)
}

/// Keep only the last `window` entries of an already-built sequence.
pub fn truncate(mut entries: Vec<HistoryEntry>, window: usize) -> Vec<HistoryEntry> {
    if entries.len() > window {
        entries.drain(..entries.len() - window);
    }
    entries
}

/// Render the window for consumption by a node action: chronological
/// `producer: text` pairs, double-newline separated.
pub fn render(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|e| format!("{}: {}", e.producer, e.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
