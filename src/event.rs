//! Canonical event types
//!
//! Every supported log schema is decoded into these types. Nothing
//! downstream of the parser knows which agent wrote a line.

use serde::{Deserialize, Serialize};

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parse the exact wire value. Anything else (`system`, `developer`, ...) is not a role we track.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A normalized conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    /// Trimmed text; multiple segments are joined with a blank line
    pub text: String,
    /// ISO-8601 timestamp as written by the agent
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TranscriptMessage {
    pub fn new(role: Role, text: impl Into<String>, timestamp: Option<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp,
        }
    }
}

/// Coarse lifecycle position of a unit of agent work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Started,
    Terminal,
}

/// The specific lifecycle marker found in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Started,
    Complete,
    Failed,
    Errored,
    Cancelled,
}

impl TaskEventKind {
    /// Map a `payload.type` value to a lifecycle marker.
    pub fn from_payload_type(value: &str) -> Option<Self> {
        match value {
            "task_started" => Some(Self::Started),
            "task_complete" => Some(Self::Complete),
            "task_failed" => Some(Self::Failed),
            "task_error" => Some(Self::Errored),
            "task_cancelled" | "task_canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self {
            Self::Started => LifecycleState::Started,
            Self::Complete | Self::Failed | Self::Errored | Self::Cancelled => {
                LifecycleState::Terminal
            }
        }
    }

    /// One-line label used by the transcript view
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started => "Task started",
            Self::Complete => "Task complete",
            Self::Failed => "Task failed",
            Self::Errored => "Task errored",
            Self::Cancelled => "Task cancelled",
        }
    }
}

/// A task lifecycle marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLifecycleEvent {
    pub kind: TaskEventKind,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TaskLifecycleEvent {
    pub fn state(&self) -> LifecycleState {
        self.kind.state()
    }
}

/// A line that decoded into something the tracker counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Message(TranscriptMessage),
    Lifecycle(TaskLifecycleEvent),
}

/// Why a line was dropped as malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not valid JSON, or not a JSON object
    InvalidJson,
    /// A conversation record without a usable `message`
    MissingMessage,
    /// `role` absent, or disagreeing with the envelope
    RoleMismatch,
}

/// Per-line parse result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Parsed(ParsedLine),
    /// Well-formed record with nothing to count (metadata, tool traffic, empty text, ...)
    Ignored,
    /// Malformed record; recovered by skipping, surfaced only as a counter
    Skipped(SkipReason),
}

impl LineOutcome {
    pub fn into_parsed(self) -> Option<ParsedLine> {
        match self {
            Self::Parsed(parsed) => Some(parsed),
            Self::Ignored | Self::Skipped(_) => None,
        }
    }
}
