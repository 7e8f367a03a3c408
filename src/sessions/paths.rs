use crate::error::{Result, WatchError};
use dashmap::DashMap;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// A located session log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileHandle {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Log tree root the file was found under
    pub root: PathBuf,
}

/// Working directory recorded by each log file, resolved once per file.
///
/// A log's working directory never changes after creation, so entries are never
/// invalidated. Files that could not be resolved are not cached.
#[derive(Debug, Default)]
pub struct SessionMetaCache {
    entries: DashMap<PathBuf, String>,
}

impl SessionMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.entries.get(path).map(|cwd| cwd.value().clone())
    }

    fn insert(&self, path: &Path, cwd: &str) {
        self.entries
            .entry(path.to_path_buf())
            .or_insert_with(|| cwd.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Default log trees: Codex rollouts and Claude Code projects.
pub fn default_log_roots() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let codex_home = std::env::var_os("CODEX_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".codex"));
    vec![
        codex_home.join("sessions"),
        home.join(".claude").join("projects"),
    ]
}

pub fn is_log_file(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Lexical normalization used when comparing working directories.
pub fn normalize_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

/// All log files under `root`, in file-name order.
///
/// A missing root, or a directory that vanishes mid-walk, contributes nothing.
fn walk_log_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_log_file(entry.path(), extension) {
                    out.push(entry.into_path());
                }
            }
            Err(err) if is_not_found(&err) => {
                trace!(root = %root.display(), "log tree entry vanished during walk");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(out)
}

fn cwd_from_record(value: &Value) -> Option<&str> {
    let cwd = if value.get("type").and_then(Value::as_str) == Some("session_meta") {
        value.get("payload").and_then(|p| p.get("cwd"))
    } else {
        value.get("cwd")
    };
    cwd.and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

/// Scan a log for the first record naming its working directory.
fn read_session_cwd(path: &Path) -> std::io::Result<Option<String>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        let Ok(value) = serde_json::from_slice::<Value>(&line) else {
            continue;
        };
        if let Some(cwd) = cwd_from_record(&value) {
            return Ok(Some(cwd.to_string()));
        }
    }
}

fn resolve_cwd(path: &Path, cache: &SessionMetaCache) -> Result<Option<String>> {
    if let Some(cwd) = cache.get(path) {
        return Ok(Some(cwd));
    }
    match read_session_cwd(path) {
        Ok(Some(cwd)) => {
            cache.insert(path, &cwd);
            Ok(Some(cwd))
        }
        Ok(None) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WatchError::io(path, e)),
    }
}

fn modified_time(path: &Path) -> Result<Option<SystemTime>> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => Ok(Some(modified)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WatchError::io(path, e)),
    }
}

/// Find the most recently modified log whose working directory is `target`.
///
/// Ties on modification time go to the lexicographically greatest path.
pub fn locate(
    roots: &[PathBuf],
    target: &Path,
    extension: &str,
    cache: &SessionMetaCache,
) -> Result<Option<LogFileHandle>> {
    let target = normalize_dir(target);
    let mut best: Option<LogFileHandle> = None;

    for root in roots {
        for path in walk_log_files(root, extension)? {
            let Some(cwd) = resolve_cwd(&path, cache)? else {
                continue;
            };
            if normalize_dir(Path::new(&cwd)) != target {
                continue;
            }
            let Some(modified) = modified_time(&path)? else {
                continue;
            };

            let newer = best
                .as_ref()
                .is_none_or(|b| (modified, &path) > (b.modified, &b.path));
            if newer {
                best = Some(LogFileHandle {
                    path,
                    modified,
                    root: root.clone(),
                });
            }
        }
    }

    if let Some(found) = &best {
        debug!(path = %found.path.display(), target = %target.display(), "located session log");
    }
    Ok(best)
}

fn is_plain_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && !session_id.contains(['/', '\\'])
}

/// Find the log named `<id>.<ext>` or `*-<id>.<ext>`; first match wins.
pub fn find_session_file(
    roots: &[PathBuf],
    session_id: &str,
    extension: &str,
) -> Result<Option<PathBuf>> {
    if !is_plain_session_id(session_id) {
        return Ok(None);
    }
    let suffix = format!("-{session_id}");

    for root in roots {
        for path in walk_log_files(root, extension)? {
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem == session_id || stem.ends_with(&suffix));
            if matches {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}
