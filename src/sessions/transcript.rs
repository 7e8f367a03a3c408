//! One-shot transcript reads for the conversation view.
//!
//! Unlike the turn tracker this re-reads the whole log on every call and keeps no
//! state; it backs a rare, user-triggered action.

use super::parser::parse_line_summarized;
use super::paths;
use crate::error::{Result, WatchError};
use crate::event::TranscriptMessage;
use std::path::PathBuf;
use tracing::debug;

/// Parse a whole log body into display messages, in file order.
pub fn messages_from_text(text: &str) -> Vec<TranscriptMessage> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(parse_line_summarized)
        .collect()
}

/// Read the transcript of `session_id` from the first matching log under `roots`.
///
/// `Ok(None)` when no log exists for the id; an empty list is a valid transcript.
pub async fn read_transcript(
    roots: &[PathBuf],
    session_id: &str,
    extension: &str,
) -> Result<Option<Vec<TranscriptMessage>>> {
    let search_roots = roots.to_vec();
    let id = session_id.to_string();
    let ext = extension.to_string();
    let found =
        tokio::task::spawn_blocking(move || paths::find_session_file(&search_roots, &id, &ext))
            .await??;
    let Some(path) = found else {
        debug!(%session_id, "no session log for transcript");
        return Ok(None);
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(WatchError::io(&path, e)),
    };
    let messages = messages_from_text(&String::from_utf8_lossy(&bytes));
    debug!(path = %path.display(), count = messages.len(), "read transcript");
    Ok(Some(messages))
}
