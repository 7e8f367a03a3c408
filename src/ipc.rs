//! Query protocol for the local socket
//!
//! Requests and responses are newline-delimited JSON, one object per line, tagged
//! by `type`.

use crate::event::TranscriptMessage;
use crate::session::{CoarseSessionStatus, TurnInfo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default socket path for `agent-eye serve`.
pub fn socket_path() -> PathBuf {
    std::env::temp_dir().join("agent-eye.sock")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    PollTurnInfo {
        repo_root: PathBuf,
        worktree: PathBuf,
        /// Overrides the configured log roots
        #[serde(default)]
        roots: Option<Vec<PathBuf>>,
        #[serde(default)]
        coarse_status: CoarseSessionStatus,
    },
    ReadTranscript {
        session_id: String,
        #[serde(default)]
        roots: Option<Vec<PathBuf>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    TurnInfo(TurnInfo),
    /// `messages` is null when no log matches the session id
    Transcript {
        messages: Option<Vec<TranscriptMessage>>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EyeState;

    #[test]
    fn poll_request_defaults() {
        let json = r#"{"type":"poll_turn_info","repo_root":"/r","worktree":"/r/wt"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::PollTurnInfo {
                repo_root: PathBuf::from("/r"),
                worktree: PathBuf::from("/r/wt"),
                roots: None,
                coarse_status: CoarseSessionStatus::None,
            }
        );
    }

    #[test]
    fn poll_request_with_status_and_roots() {
        let json = r#"{"type":"poll_turn_info","repo_root":"/r","worktree":"/r/wt","roots":["/logs"],"coarse_status":"created"}"#;
        match serde_json::from_str::<Request>(json).unwrap() {
            Request::PollTurnInfo {
                roots,
                coarse_status,
                ..
            } => {
                assert_eq!(roots, Some(vec![PathBuf::from("/logs")]));
                assert_eq!(coarse_status, CoarseSessionStatus::Created);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn transcript_request() {
        let json = r#"{"type":"read_transcript","session_id":"abc"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::ReadTranscript {
                session_id: "abc".into(),
                roots: None,
            }
        );
    }

    #[test]
    fn turn_info_response_is_flat() {
        let resp = Response::TurnInfo(TurnInfo::untracked(EyeState::Generating));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "turn_info",
                "eye_state": "generating",
                "has_active_tracker": false
            })
        );
        let parsed: Response = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn missing_transcript_is_null() {
        let json = serde_json::to_string(&Response::Transcript { messages: None }).unwrap();
        assert_eq!(json, r#"{"type":"transcript","messages":null}"#);
    }
}
