//! Unix socket server answering turn-status and transcript queries
//!
//! Each connection sends newline-delimited [`Request`]s and receives one
//! [`Response`] line per request, in order.

use crate::error::{Result, WatchError};
use crate::ipc::{Request, Response};
use crate::sessions::TurnService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, info, trace, warn};

/// Answer a single request line.
pub async fn handle_request(
    service: &TurnService,
    default_roots: &[PathBuf],
    line: &str,
) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            trace!("Failed to parse request: {}", e);
            return Response::Error {
                message: format!("invalid request: {e}"),
            };
        }
    };
    debug!(?request, "query");

    match request {
        Request::PollTurnInfo {
            repo_root,
            worktree,
            roots,
            coarse_status,
        } => {
            let roots = roots.as_deref().unwrap_or(default_roots);
            Response::TurnInfo(
                service
                    .poll_turn_info(&repo_root, &worktree, roots, coarse_status)
                    .await,
            )
        }
        Request::ReadTranscript { session_id, roots } => {
            let roots = roots.as_deref().unwrap_or(default_roots);
            match service.read_transcript(roots, &session_id).await {
                Ok(messages) => Response::Transcript { messages },
                Err(e) => {
                    warn!(%session_id, error = %e, "transcript read failed");
                    Response::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
    }
}

/// Serve one connection until the peer closes it.
pub async fn handle_connection<R, W>(
    reader: R,
    mut writer: W,
    service: &TurnService,
    default_roots: &[PathBuf],
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_request(service, default_roots, &line).await;
        let mut out = serde_json::to_vec(&response).map_err(std::io::Error::other)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Bind `path` and serve queries forever.
///
/// A stale socket file at `path` is removed first.
pub async fn start(
    service: Arc<TurnService>,
    default_roots: Arc<Vec<PathBuf>>,
    path: &Path,
) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| WatchError::io(path, e))?;
    }

    let listener = UnixListener::bind(path).map_err(|e| WatchError::io(path, e))?;
    info!("query server listening on {}", path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let service = Arc::clone(&service);
                let roots = Arc::clone(&default_roots);
                tokio::spawn(async move {
                    let (read, write) = stream.into_split();
                    if let Err(e) = handle_connection(read, write, &service, &roots).await {
                        debug!("connection closed with error: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept socket connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EyeState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn invalid_request_yields_error_response() {
        let service = TurnService::default();
        match handle_request(&service, &[], "{\"type\":\"nope\"}").await {
            Response::Error { message } => assert!(message.starts_with("invalid request")),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_uses_default_roots_when_omitted() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("s.jsonl"),
            "{\"type\":\"user\",\"cwd\":\"/w\",\"message\":{\"role\":\"user\",\"content\":\"go\"}}\n",
        )
        .unwrap();

        let service = TurnService::default();
        let roots = vec![tmp.path().to_path_buf()];
        let line = r#"{"type":"poll_turn_info","repo_root":"/","worktree":"/w"}"#;
        match handle_request(&service, &roots, line).await {
            Response::TurnInfo(info) => {
                assert_eq!(info.eye_state, EyeState::Generating);
                assert!(info.has_active_tracker);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_answers_each_line_in_order() {
        let service = TurnService::default();
        let input: &[u8] = b"garbage\n\n{\"type\":\"read_transcript\",\"session_id\":\"abc\",\"roots\":[]}\n";
        let mut output = Vec::new();

        handle_connection(input, &mut output, &service, &[])
            .await
            .unwrap();

        let lines: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0], Response::Error { .. }));
        assert_eq!(lines[1], Response::Transcript { messages: None });
    }
}
