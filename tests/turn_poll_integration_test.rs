use agent_eye::ipc::{Request, Response};
use agent_eye::sessions::{ServiceOptions, TurnService};
use agent_eye::{CoarseSessionStatus, EyeState, Role, server};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

fn append_jsonl(path: &Path, lines: &[serde_json::Value]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{}", serde_json::to_string(line).unwrap()).unwrap();
    }
}

fn claude_user(text: &str, ts: &str) -> serde_json::Value {
    json!({
        "type": "user",
        "cwd": "/work/app",
        "timestamp": ts,
        "message": { "role": "user", "content": text }
    })
}

fn claude_assistant(text: &str, ts: &str) -> serde_json::Value {
    json!({
        "type": "assistant",
        "cwd": "/work/app",
        "timestamp": ts,
        "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] }
    })
}

async fn poll(service: &TurnService, root: &Path) -> agent_eye::TurnInfo {
    service
        .poll_turn_info(
            Path::new("/work"),
            Path::new("/work/app"),
            &[root.to_path_buf()],
            CoarseSessionStatus::None,
        )
        .await
}

#[tokio::test]
async fn conversation_log_without_lifecycle_follows_message_balance() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("projects");
    std::fs::create_dir_all(root.join("-work-app")).unwrap();
    let log = root.join("-work-app/0f6c.jsonl");

    let service = TurnService::default();
    assert_eq!(poll(&service, &root).await.eye_state, EyeState::Stopped);

    append_jsonl(&log, &[claude_user("fix the build", "2026-03-01T10:00:00Z")]);
    let info = poll(&service, &root).await;
    assert_eq!(info.eye_state, EyeState::Generating);
    assert_eq!(info.last_user_timestamp.as_deref(), Some("2026-03-01T10:00:00Z"));
    assert!(info.updated_time.is_some());

    append_jsonl(
        &log,
        &[claude_assistant("Build fixed.", "2026-03-01T10:00:05Z")],
    );
    let info = poll(&service, &root).await;
    assert_eq!(info.eye_state, EyeState::Idle);
    let latest = info.latest_assistant_message.unwrap();
    assert_eq!(latest.text, "Build fixed.");
    assert_eq!(latest.timestamp.as_deref(), Some("2026-03-01T10:00:05Z"));

    let counters = info.counters.unwrap();
    assert!(!counters.has_task_lifecycle_events);
    assert_eq!(counters.last_user_prompt_index, 1);
    assert_eq!(counters.last_assistant_message_index, 1);
}

#[tokio::test]
async fn malformed_lines_are_counted_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("s.jsonl");
    append_jsonl(&log, &[claude_user("hi", "2026-03-01T10:00:00Z")]);
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
        file.write_all(b"{not json\n").unwrap();
        file.write_all(b"{\"type\":\"assistant\",\"message\":{\"role\":\"user\",\"content\":\"x\"}}\n")
            .unwrap();
    }

    let service = TurnService::default();
    let info = poll(&service, tmp.path()).await;
    assert_eq!(info.eye_state, EyeState::Generating);
    assert_eq!(info.counters.unwrap().skipped_lines, 2);
}

#[tokio::test]
async fn codex_rollout_transcript_with_custom_extension() {
    let tmp = TempDir::new().unwrap();
    let day = tmp.path().join("2026/01/01");
    std::fs::create_dir_all(&day).unwrap();
    let log = day.join("rollout-2026-01-01-abc.log");
    append_jsonl(
        &log,
        &[
            json!({ "type": "session_meta", "payload": { "id": "abc", "cwd": "/work/app" } }),
            json!({ "type": "event_msg", "payload": { "type": "task_started" } }),
            json!({
                "type": "response_item",
                "payload": {
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_text", "text": "list files" }]
                }
            }),
            json!({
                "type": "response_item",
                "payload": {
                    "type": "message",
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": "Here they are." }]
                }
            }),
            json!({ "type": "event_msg", "payload": { "type": "task_complete" } }),
        ],
    );
    // Same id with the default extension must not be picked up.
    std::fs::write(tmp.path().join("abc.jsonl"), "").unwrap();

    let service = TurnService::new(ServiceOptions {
        log_extension: "log".into(),
        ..ServiceOptions::default()
    });
    let roots = vec![tmp.path().to_path_buf()];

    let info = service
        .poll_turn_info(
            Path::new("/work"),
            Path::new("/work/app"),
            &roots,
            CoarseSessionStatus::Created,
        )
        .await;
    assert_eq!(info.eye_state, EyeState::Idle);
    assert_eq!(info.session_path.as_deref(), Some(log.as_path()));

    let messages = service.read_transcript(&roots, "abc").await.unwrap().unwrap();
    let texts: Vec<(Role, &str)> = messages.iter().map(|m| (m.role, m.text.as_str())).collect();
    assert!(texts.contains(&(Role::User, "list files")));
    assert!(texts.contains(&(Role::Assistant, "Here they are.")));
    assert_eq!(texts.first(), Some(&(Role::Assistant, "Task started")));
}

async fn connect_with_retry(path: &Path) -> UnixStream {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never came up at {}", path.display());
}

#[tokio::test]
async fn socket_server_answers_poll_and_transcript() {
    let tmp = TempDir::new().unwrap();
    let logs = tmp.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    append_jsonl(
        &logs.join("abc.jsonl"),
        &[claude_user("hello", "2026-03-01T10:00:00Z")],
    );
    let socket: PathBuf = tmp.path().join("eye.sock");

    let service = Arc::new(TurnService::default());
    let roots = Arc::new(vec![logs.clone()]);
    let server_socket = socket.clone();
    let server = tokio::spawn(async move { server::start(service, roots, &server_socket).await });

    let stream = connect_with_retry(&socket).await;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let requests = [
        Request::PollTurnInfo {
            repo_root: PathBuf::from("/work"),
            worktree: PathBuf::from("/work/app"),
            roots: None,
            coarse_status: CoarseSessionStatus::None,
        },
        Request::ReadTranscript {
            session_id: "abc".into(),
            roots: None,
        },
    ];
    for request in &requests {
        let mut out = serde_json::to_vec(request).unwrap();
        out.push(b'\n');
        write.write_all(&out).await.unwrap();
    }

    let first = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match serde_json::from_str::<Response>(&first).unwrap() {
        Response::TurnInfo(info) => assert_eq!(info.eye_state, EyeState::Generating),
        other => panic!("unexpected response: {other:?}"),
    }

    let second = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match serde_json::from_str::<Response>(&second).unwrap() {
        Response::Transcript {
            messages: Some(messages),
        } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].text, "hello");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    server.abort();
}
