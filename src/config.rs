//! Persisted configuration (`config.json` in the platform config directory).
//!
//! On macOS this resolves to `~/Library/Application Support/agent-eye/`, on Linux
//! to `~/.config/agent-eye/`. Missing or invalid fields fall back to defaults.

use crate::error::{Result, WatchError};
use crate::sessions::default_log_roots;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment override for `log_roots` (platform path-list syntax).
pub const ROOTS_ENV: &str = "AGENT_EYE_ROOTS";

/// User configuration (persisted to config.json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log trees searched for session logs
    #[serde(default = "default_log_roots")]
    pub log_roots: Vec<PathBuf>,
    /// Session log file extension, without the dot
    #[serde(default = "default_log_extension")]
    pub log_extension: String,
    /// Deadline for a single poll or transcript read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Report `error` once a `created` session has had no log for this long
    #[serde(default)]
    pub created_timeout_secs: Option<u64>,
    /// Query socket for `agent-eye serve`
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

fn default_log_extension() -> String {
    "jsonl".to_string()
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_roots: default_log_roots(),
            log_extension: default_log_extension(),
            read_timeout_ms: default_read_timeout_ms(),
            created_timeout_secs: None,
            socket_path: None,
        }
    }
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn created_timeout(&self) -> Option<Duration> {
        self.created_timeout_secs.map(Duration::from_secs)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(crate::ipc::socket_path)
    }

    /// Replace `log_roots` with the paths in `AGENT_EYE_ROOTS`, if set and non-empty.
    fn apply_env(mut self) -> Self {
        if let Some(raw) = std::env::var_os(ROOTS_ENV) {
            let roots: Vec<PathBuf> = std::env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !roots.is_empty() {
                self.log_roots = roots;
            }
        }
        self
    }
}

/// agent-eye config directory (e.g. `~/.config/agent-eye/`).
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("agent-eye"))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

/// Load config from disk with environment overrides, returning defaults if the file
/// is missing or invalid.
pub fn load_config() -> Config {
    let config = match config_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    };
    config.apply_env()
}

/// Save config to disk.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_path()
        .ok_or_else(|| WatchError::Config("config dir not found".to_string()))?;
    save_config_to(config, &path)?;
    Ok(path)
}

fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WatchError::io(parent, e))?;
    }
    let json =
        serde_json::to_string_pretty(config).map_err(|e| WatchError::Config(e.to_string()))?;
    atomic_write(path, json.as_bytes()).map_err(|e| WatchError::io(path, e))
}

/// Write to a temp file in the same directory, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
