//! Session status types exposed to callers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse status shown by the UI's "eye"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EyeState {
    /// No agent output to follow
    #[default]
    Stopped,
    /// Log found, nothing in flight
    Idle,
    /// A task or prompt is still unanswered
    Generating,
    /// The log could not be located or read
    Error,
}

/// Caller-persisted hint, consulted only while no log file exists yet
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum CoarseSessionStatus {
    #[default]
    None,
    Created,
    Stopped,
    Error,
}

impl CoarseSessionStatus {
    /// Lenient parse; unknown values mean "no hint".
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "stopped" => Self::Stopped,
            "error" => Self::Error,
            _ => Self::None,
        }
    }

    /// Fallback eye state when no log file can be located.
    pub fn eye_state(&self) -> EyeState {
        match self {
            Self::None => EyeState::Stopped,
            Self::Created => EyeState::Generating,
            Self::Stopped => EyeState::Stopped,
            Self::Error => EyeState::Error,
        }
    }
}

impl From<String> for CoarseSessionStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// Event counters of a turn tracker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCounters {
    pub has_task_lifecycle_events: bool,
    pub task_started_index: u64,
    pub task_terminal_index: u64,
    pub last_user_prompt_index: u64,
    pub last_assistant_message_index: u64,
    /// Malformed lines dropped so far
    #[serde(default)]
    pub skipped_lines: u64,
}

/// Most recent assistant message seen in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestAssistantMessage {
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Result of polling one worktree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInfo {
    pub eye_state: EyeState,
    pub has_active_tracker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters: Option<TurnCounters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assistant_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_assistant_message: Option<LatestAssistantMessage>,
    /// RFC 3339 time of the last successful advance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<String>,
}

impl TurnInfo {
    /// Result for a poll that ended without a live tracker
    pub fn untracked(eye_state: EyeState) -> Self {
        Self {
            eye_state,
            ..Self::default()
        }
    }
}
