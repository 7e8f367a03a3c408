use super::parser::parse_line;
use crate::error::{Result, WatchError};
use crate::event::{LifecycleState, LineOutcome, ParsedLine, Role};
use crate::session::{EyeState, LatestAssistantMessage, TurnCounters, TurnInfo};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

const READ_CHUNK: u64 = 64 * 1024;

/// Split complete lines off the front of `buffer`, leaving any unterminated tail.
///
/// `buffer[..scan_from]` must hold no newline; only the bytes after it are searched.
fn drain_lines(buffer: &mut Vec<u8>, scan_from: usize, mut on_line: impl FnMut(&str)) {
    let mut start = 0usize;
    let mut cursor = scan_from.min(buffer.len());

    while let Some(pos) = buffer[cursor..].iter().position(|&b| b == b'\n') {
        let idx = cursor + pos;
        let line = String::from_utf8_lossy(&buffer[start..idx]);
        let line = line.trim();
        if !line.is_empty() {
            on_line(line);
        }
        start = idx + 1;
        cursor = start;
    }

    if start > 0 {
        buffer.drain(..start);
    }
}

/// Two-branch status decision over a tracker's counters.
///
/// Lifecycle markers win when the log has any; otherwise an unanswered prompt means
/// the agent is still generating.
pub fn derive_eye_state(counters: &TurnCounters) -> EyeState {
    let generating = if counters.has_task_lifecycle_events {
        counters.task_started_index > counters.task_terminal_index
    } else {
        counters.last_user_prompt_index > counters.last_assistant_message_index
    };
    if generating {
        EyeState::Generating
    } else {
        EyeState::Idle
    }
}

/// Incremental read state for one bound log file
#[derive(Debug, Clone)]
pub struct TurnTracker {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
    counters: TurnCounters,
    last_user_timestamp: Option<String>,
    last_assistant_timestamp: Option<String>,
    latest_assistant_message: Option<LatestAssistantMessage>,
    updated_time: DateTime<Utc>,
}

impl TurnTracker {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            pending: Vec::new(),
            counters: TurnCounters::default(),
            last_user_timestamp: None,
            last_assistant_timestamp: None,
            latest_assistant_message: None,
            updated_time: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes after the last newline, not yet parsed
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn counters(&self) -> &TurnCounters {
        &self.counters
    }

    pub fn latest_assistant_message(&self) -> Option<&LatestAssistantMessage> {
        self.latest_assistant_message.as_ref()
    }

    pub fn eye_state(&self) -> EyeState {
        derive_eye_state(&self.counters)
    }

    /// A tracker is only reusable for the same file, and only while the file has not shrunk.
    pub fn needs_rebuild(&self, path: &Path, size: u64) -> bool {
        self.path != path || size < self.offset
    }

    /// Feed bytes read from the log. Complete lines are parsed; the tail is kept for later.
    pub fn ingest(&mut self, bytes: &[u8]) {
        let mut pending = std::mem::take(&mut self.pending);
        let scan_from = pending.len();
        pending.extend_from_slice(bytes);
        drain_lines(&mut pending, scan_from, |line| self.apply(parse_line(line)));
        self.pending = pending;
    }

    fn apply(&mut self, outcome: LineOutcome) {
        let counters = &mut self.counters;
        match outcome {
            LineOutcome::Parsed(ParsedLine::Lifecycle(event)) => {
                counters.has_task_lifecycle_events = true;
                match event.state() {
                    LifecycleState::Started => counters.task_started_index += 1,
                    LifecycleState::Terminal => counters.task_terminal_index += 1,
                }
            }
            LineOutcome::Parsed(ParsedLine::Message(msg)) => match msg.role {
                Role::User => {
                    counters.last_user_prompt_index += 1;
                    if msg.timestamp.is_some() {
                        self.last_user_timestamp = msg.timestamp;
                    }
                }
                Role::Assistant => {
                    counters.last_assistant_message_index += 1;
                    if msg.timestamp.is_some() {
                        self.last_assistant_timestamp = msg.timestamp.clone();
                    }
                    self.latest_assistant_message = Some(LatestAssistantMessage {
                        text: msg.text,
                        timestamp: msg.timestamp,
                    });
                }
            },
            LineOutcome::Skipped(reason) => {
                counters.skipped_lines += 1;
                // Line content may hold user data; log the reason only.
                debug!(path = %self.path.display(), ?reason, "skipping malformed log line");
            }
            LineOutcome::Ignored => {}
        }
    }

    /// Read `[offset, size)` from the bound file and ingest it.
    ///
    /// Short reads are retried until `size` is reached or the file ends early. The
    /// offset only moves past bytes that were actually read.
    pub async fn read_to(&mut self, size: u64) -> Result<u64> {
        let start = self.offset;
        if size > start {
            let path = self.path.clone();
            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| WatchError::io(&path, e))?;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| WatchError::io(&path, e))?;

            let mut remaining = size - start;
            let mut chunk = vec![0u8; remaining.min(READ_CHUNK) as usize];
            while remaining > 0 {
                let want = remaining.min(chunk.len() as u64) as usize;
                let n = file
                    .read(&mut chunk[..want])
                    .await
                    .map_err(|e| WatchError::io(&path, e))?;
                if n == 0 {
                    trace!(path = %path.display(), remaining, "session log ended before expected size");
                    break;
                }
                self.ingest(&chunk[..n]);
                self.offset += n as u64;
                remaining -= n as u64;
            }
        }
        self.updated_time = Utc::now();
        Ok(self.offset - start)
    }

    pub fn turn_info(&self) -> TurnInfo {
        TurnInfo {
            eye_state: self.eye_state(),
            has_active_tracker: true,
            session_path: Some(self.path.clone()),
            counters: Some(self.counters.clone()),
            last_user_timestamp: self.last_user_timestamp.clone(),
            last_assistant_timestamp: self.last_assistant_timestamp.clone(),
            latest_assistant_message: self.latest_assistant_message.clone(),
            updated_time: Some(self.updated_time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}
