use crate::event::{
    LineOutcome, ParsedLine, Role, SkipReason, TaskEventKind, TaskLifecycleEvent,
    TranscriptMessage,
};
use serde::Deserialize;
use serde_json::Value;

const SEGMENT_SEPARATOR: &str = "\n\n";
const SUMMARY_MAX_CHARS: usize = 80;
const SUMMARY_MAX_LINES: usize = 3;
/// Tool input fields tried in order when summarizing a call.
const SUMMARY_FIELDS: &[&str] = &["description", "command", "cmd", "pattern", "path"];

fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn timestamp_of(value: &Value) -> Option<String> {
    json_str(value, "timestamp")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", value[..idx].trim_end()),
        None => value.to_string(),
    }
}

fn join_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

/// A typed content segment. Unknown or malformed segments are dropped individually.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Segment {
    InputText {
        #[serde(default)]
        text: String,
    },
    OutputText {
        #[serde(default)]
        text: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

fn segments(content: &Value) -> Vec<Segment> {
    content
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| Segment::deserialize(item).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Envelope discriminant. Rollout records are tried first, then conversation records.
enum Record<'a> {
    /// `{type, timestamp, payload: {type, ...}}`
    Rollout {
        timestamp: Option<String>,
        payload: &'a Value,
    },
    /// `{type: "user"|"assistant", isMeta, message: {role, content}}`
    Conversation {
        role: Role,
        timestamp: Option<String>,
        value: &'a Value,
    },
    Unrecognized,
}

fn classify(value: &Value) -> Record<'_> {
    if let Some(payload) = value.get("payload")
        && payload.is_object()
        && json_str(payload, "type").is_some()
    {
        return Record::Rollout {
            timestamp: timestamp_of(value),
            payload,
        };
    }

    if let Some(role) = json_str(value, "type").and_then(Role::from_wire) {
        return Record::Conversation {
            role,
            timestamp: timestamp_of(value),
            value,
        };
    }

    Record::Unrecognized
}

fn decode(raw: &str) -> Result<Value, SkipReason> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(SkipReason::InvalidJson),
    }
}

/// Parse one log line into a canonical message or lifecycle event.
///
/// Never fails: malformed input comes back as [`LineOutcome::Skipped`], and well-formed
/// records that carry nothing countable as [`LineOutcome::Ignored`].
pub fn parse_line(raw: &str) -> LineOutcome {
    if raw.trim().is_empty() {
        return LineOutcome::Ignored;
    }
    let value = match decode(raw) {
        Ok(v) => v,
        Err(reason) => return LineOutcome::Skipped(reason),
    };

    match classify(&value) {
        Record::Rollout { timestamp, payload } => parse_rollout(payload, timestamp),
        Record::Conversation {
            role,
            timestamp,
            value,
        } => match conversation_message(role, value) {
            Ok(Some(content)) => {
                let text = conversation_text(content);
                if text.is_empty() {
                    LineOutcome::Ignored
                } else {
                    LineOutcome::Parsed(ParsedLine::Message(TranscriptMessage::new(
                        role, text, timestamp,
                    )))
                }
            }
            Ok(None) => LineOutcome::Ignored,
            Err(reason) => LineOutcome::Skipped(reason),
        },
        Record::Unrecognized => LineOutcome::Ignored,
    }
}

fn parse_rollout(payload: &Value, timestamp: Option<String>) -> LineOutcome {
    let payload_type = json_str(payload, "type").unwrap_or("");
    if payload_type == "message" {
        return match rollout_message(payload, timestamp) {
            Ok(Some(msg)) => LineOutcome::Parsed(ParsedLine::Message(msg)),
            Ok(None) => LineOutcome::Ignored,
            Err(reason) => LineOutcome::Skipped(reason),
        };
    }

    match TaskEventKind::from_payload_type(payload_type) {
        Some(kind) => {
            LineOutcome::Parsed(ParsedLine::Lifecycle(TaskLifecycleEvent { kind, timestamp }))
        }
        None => LineOutcome::Ignored,
    }
}

/// `Err` when `role` is missing or not a string; `Ok(None)` for other roles or empty text.
fn rollout_message(
    payload: &Value,
    timestamp: Option<String>,
) -> Result<Option<TranscriptMessage>, SkipReason> {
    let role = json_str(payload, "role").ok_or(SkipReason::RoleMismatch)?;
    let Some(role) = Role::from_wire(role) else {
        return Ok(None);
    };
    let content = payload.get("content").unwrap_or(&Value::Null);
    let parts = segments(content);
    let text = join_text(parts.iter().filter_map(|seg| match seg {
        Segment::InputText { text } | Segment::OutputText { text } => Some(text.as_str()),
        _ => None,
    }));
    Ok((!text.is_empty()).then(|| TranscriptMessage::new(role, text, timestamp)))
}

/// Validate a conversation record and return its `message.content`.
///
/// `Ok(None)` for meta records, which are dropped without counting.
fn conversation_message(role: Role, value: &Value) -> Result<Option<&Value>, SkipReason> {
    if value
        .get("isMeta")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Ok(None);
    }

    let message = value
        .get("message")
        .filter(|m| m.is_object())
        .ok_or(SkipReason::MissingMessage)?;
    if json_str(message, "role") != Some(role.as_str()) {
        return Err(SkipReason::RoleMismatch);
    }
    Ok(Some(message.get("content").unwrap_or(&Value::Null)))
}

fn conversation_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(_) => {
            let parts = segments(content);
            join_text(parts.iter().filter_map(|seg| match seg {
                Segment::Text { text } => Some(text.as_str()),
                _ => None,
            }))
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Summarizing mode (transcript view)
// ---------------------------------------------------------------------------

/// Parse one line for display, synthesizing assistant messages for tool traffic and
/// lifecycle markers that [`parse_line`] drops.
pub fn parse_line_summarized(raw: &str) -> Vec<TranscriptMessage> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let Ok(value) = decode(raw) else {
        return Vec::new();
    };

    match classify(&value) {
        Record::Rollout { timestamp, payload } => summarize_rollout(payload, timestamp)
            .into_iter()
            .collect(),
        Record::Conversation {
            role,
            timestamp,
            value,
        } => match conversation_message(role, value) {
            Ok(Some(content)) => summarize_conversation(role, content, timestamp),
            _ => Vec::new(),
        },
        Record::Unrecognized => Vec::new(),
    }
}

fn summarize_rollout(payload: &Value, timestamp: Option<String>) -> Option<TranscriptMessage> {
    let payload_type = json_str(payload, "type").unwrap_or("");
    match payload_type {
        "message" => rollout_message(payload, timestamp).ok().flatten(),
        "function_call" | "custom_tool_call" => {
            let name = json_str(payload, "name").unwrap_or("tool");
            let input = payload
                .get("arguments")
                .or_else(|| payload.get("input"))
                .unwrap_or(&Value::Null);
            Some(TranscriptMessage::new(
                Role::Assistant,
                tool_call_line(name, input),
                timestamp,
            ))
        }
        "function_call_output" | "custom_tool_call_output" => {
            let output = payload.get("output").unwrap_or(&Value::Null);
            let (content, is_error) = match output {
                Value::Object(_) => (
                    output.get("content").unwrap_or(&Value::Null),
                    output.get("success").and_then(Value::as_bool) == Some(false),
                ),
                _ => (output, false),
            };
            Some(TranscriptMessage::new(
                Role::Assistant,
                tool_result_line(content, is_error),
                timestamp,
            ))
        }
        other => TaskEventKind::from_payload_type(other)
            .map(|kind| TranscriptMessage::new(Role::Assistant, kind.label(), timestamp)),
    }
}

fn summarize_conversation(
    role: Role,
    content: &Value,
    timestamp: Option<String>,
) -> Vec<TranscriptMessage> {
    if let Value::String(s) = content {
        let text = s.trim();
        if text.is_empty() {
            return Vec::new();
        }
        return vec![TranscriptMessage::new(role, text, timestamp)];
    }

    // Adjacent parts by the same author collapse into one message.
    let mut grouped: Vec<(Role, Vec<String>)> = Vec::new();
    for seg in segments(content) {
        let part = match seg {
            Segment::Text { text } if !text.trim().is_empty() => (role, text),
            Segment::ToolUse { name, input } => (Role::Assistant, tool_call_line(&name, &input)),
            Segment::ToolResult { content, is_error } => (
                Role::Assistant,
                tool_result_line(&content, is_error.unwrap_or(false)),
            ),
            _ => continue,
        };
        match grouped.last_mut() {
            Some((last_role, texts)) if *last_role == part.0 => texts.push(part.1),
            _ => grouped.push((part.0, vec![part.1])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(role, texts)| {
            let text = join_text(texts.iter().map(String::as_str));
            (!text.is_empty()).then(|| TranscriptMessage::new(role, text, timestamp.clone()))
        })
        .collect()
}

fn tool_call_line(name: &str, input: &Value) -> String {
    let name = match name.trim() {
        "" => "tool",
        n => n,
    };
    match tool_input_summary(input) {
        Some(summary) => format!("Tool call: `{name}` (`{summary}`)"),
        None => format!("Tool call: `{name}`"),
    }
}

fn tool_result_line(content: &Value, is_error: bool) -> String {
    let label = if is_error { "Tool error" } else { "Tool result" };
    format!("{label}: `{}`", summarize_text(&content_text(content)))
}

/// First non-blank candidate field of a tool input, truncated.
fn tool_input_summary(input: &Value) -> Option<String> {
    match input {
        Value::Object(_) => SUMMARY_FIELDS.iter().find_map(|key| {
            let text = match input.get(*key)? {
                Value::String(s) => s.trim().to_string(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim()
                    .to_string(),
                _ => return None,
            };
            (!text.is_empty()).then(|| truncate_chars(&text, SUMMARY_MAX_CHARS))
        }),
        // Codex passes function arguments as a JSON-encoded string.
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => tool_input_summary(&parsed),
            _ => s
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(|line| truncate_chars(line, SUMMARY_MAX_CHARS)),
        },
        _ => None,
    }
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                _ => json_str(item, "text"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => json_str(content, "text").unwrap_or("").to_string(),
        _ => String::new(),
    }
}

/// Keep the first few non-blank lines, noting how many were dropped.
fn summarize_text(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return "no output".to_string();
    }

    let kept = lines
        .iter()
        .take(SUMMARY_MAX_LINES)
        .map(|line| truncate_chars(line, SUMMARY_MAX_CHARS))
        .collect::<Vec<_>>()
        .join("\n");
    match lines.len().saturating_sub(SUMMARY_MAX_LINES) {
        0 => kept,
        more => format!("{kept} (+{more} more lines)"),
    }
}
