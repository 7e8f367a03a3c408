//! Error type for log discovery and tailing

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while locating or reading session logs
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("config error: {0}")]
    Config(String),
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = WatchError> = std::result::Result<T, E>;
