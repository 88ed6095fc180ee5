//! Message chunking — greedy packing under the platform payload limit.

use opsrelay_core::types::FileRecord;

/// Maximum characters per outgoing message, kept under the messaging
/// API's payload limit.
pub const MAX_MESSAGE_LEN: usize = 1800;

/// Format one file as a message entry: name plus link when present.
pub fn format_entry(file: &FileRecord) -> String {
    if file.web_view_link.is_empty() {
        file.name.clone()
    } else {
        format!("{}\n{}", file.name, file.web_view_link)
    }
}

/// Pack a header and pre-formatted entries into messages of at most
/// [`MAX_MESSAGE_LEN`] characters.
///
/// Entries are joined with a blank line; when adding an entry would
/// overflow, the current message is flushed and the entry starts the
/// next one. An entry too large to fit even alone is truncated and
/// flushed as its own message. Zero entries still yields the header,
/// never an empty list.
pub fn chunk_messages(header: &str, entries: &[String]) -> Vec<String> {
    if entries.is_empty() {
        return vec![header.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = header.to_string();

    for entry in entries {
        let next = if current.is_empty() {
            entry.clone()
        } else {
            format!("{current}\n\n{entry}")
        };

        if char_len(&next) > MAX_MESSAGE_LEN && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            if char_len(entry) > MAX_MESSAGE_LEN {
                chunks.push(truncate(entry));
            } else {
                current = entry.clone();
            }
        } else if char_len(&next) > MAX_MESSAGE_LEN {
            // Entry alone exceeds the limit.
            chunks.push(truncate(entry));
        } else {
            current = next;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_MESSAGE_LEN).collect()
}
