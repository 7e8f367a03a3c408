//! Session log tailing.
//!
//! Agents append newline-delimited JSON to their session logs (Codex rollouts under
//! `~/.codex/sessions/**.jsonl`, Claude Code transcripts under `~/.claude/projects`).
//! [`TurnService`] finds the current log for a worktree and, on each poll, reads only
//! the bytes appended since the previous poll to keep a running turn status.
//!
//! Nothing runs in the background: state advances only when a caller polls.

mod parser;
mod paths;
mod tracker;
mod transcript;

pub use parser::{parse_line, parse_line_summarized};
pub use paths::{
    LogFileHandle, SessionMetaCache, default_log_roots, find_session_file, is_log_file, locate,
    normalize_dir,
};
pub use tracker::{TurnTracker, derive_eye_state};
pub use transcript::{messages_from_text, read_transcript};

use crate::config::Config;
use crate::error::{Result, WatchError};
use crate::event::TranscriptMessage;
use crate::session::{CoarseSessionStatus, EyeState, TurnInfo};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Identity of a monitored worktree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackerKey {
    pub repo_root: PathBuf,
    pub worktree: PathBuf,
}

/// Tunables for [`TurnService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    pub log_extension: String,
    /// Deadline for one poll or transcript read
    pub read_timeout: Duration,
    /// How long `created` may go without a log before reporting `error`
    pub created_timeout: Option<Duration>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            log_extension: config.log_extension.clone(),
            read_timeout: config.read_timeout(),
            created_timeout: config.created_timeout(),
        }
    }
}

#[derive(Debug, Default)]
struct KeySlot {
    tracker: Option<TurnTracker>,
    /// First poll that saw `created` with no log yet
    created_since: Option<Instant>,
}

/// Turn status and transcript service.
///
/// Holds one tracker per `(repo root, worktree)` behind its own lock, so concurrent
/// polls of the same key are serialized while different keys run in parallel.
#[derive(Debug)]
pub struct TurnService {
    options: ServiceOptions,
    slots: DashMap<TrackerKey, Arc<Mutex<KeySlot>>>,
    meta_cache: Arc<SessionMetaCache>,
}

impl Default for TurnService {
    fn default() -> Self {
        Self::new(ServiceOptions::default())
    }
}

impl TurnService {
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            options,
            slots: DashMap::new(),
            meta_cache: Arc::new(SessionMetaCache::new()),
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn meta_cache(&self) -> &SessionMetaCache {
        &self.meta_cache
    }

    fn slot(&self, key: &TrackerKey) -> Arc<Mutex<KeySlot>> {
        // Clone the Arc so the shard lock is released before awaiting the key lock.
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    /// Current turn status of `worktree`.
    ///
    /// Never fails: locate and read failures are reported as [`EyeState::Error`] and
    /// drop the tracker, so the next poll starts over from the beginning of the log.
    /// A poll that runs past `read_timeout` also reports `Error` but keeps the bytes it
    /// consumed; the next poll continues from there.
    pub async fn poll_turn_info(
        &self,
        repo_root: &Path,
        worktree: &Path,
        roots: &[PathBuf],
        coarse_status: CoarseSessionStatus,
    ) -> TurnInfo {
        let key = TrackerKey {
            repo_root: repo_root.to_path_buf(),
            worktree: worktree.to_path_buf(),
        };
        let slot = self.slot(&key);
        let mut slot = slot.lock().await;

        let poll = self.poll_locked(&mut slot, worktree, roots, coarse_status);
        let outcome = tokio::time::timeout(self.options.read_timeout, poll).await;
        match outcome {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                warn!(worktree = %worktree.display(), error = %e, "turn poll failed");
                slot.tracker = None;
                TurnInfo::untracked(EyeState::Error)
            }
            Err(_) => {
                let e = WatchError::Timeout(self.options.read_timeout);
                let offset = slot.tracker.as_ref().map(TurnTracker::offset);
                warn!(worktree = %worktree.display(), error = %e, ?offset, "turn poll timed out");
                TurnInfo {
                    has_active_tracker: slot.tracker.is_some(),
                    session_path: slot.tracker.as_ref().map(|t| t.path().to_path_buf()),
                    ..TurnInfo::untracked(EyeState::Error)
                }
            }
        }
    }

    async fn poll_locked(
        &self,
        slot: &mut KeySlot,
        worktree: &Path,
        roots: &[PathBuf],
        coarse_status: CoarseSessionStatus,
    ) -> Result<TurnInfo> {
        let Some(handle) = self.locate(roots, worktree).await? else {
            if let Some(stale) = slot.tracker.take() {
                debug!(path = %stale.path().display(), "session log no longer found; dropping tracker");
            }
            return Ok(TurnInfo::untracked(self.fallback_state(slot, coarse_status)));
        };
        slot.created_since = None;

        let size = tokio::fs::metadata(&handle.path)
            .await
            .map_err(|e| WatchError::io(&handle.path, e))?
            .len();

        let tracker = match slot.tracker.take() {
            Some(tracker) if !tracker.needs_rebuild(&handle.path, size) => tracker,
            Some(stale) => {
                info!(
                    old = %stale.path().display(),
                    new = %handle.path.display(),
                    offset = stale.offset(),
                    size,
                    "session log changed or shrank; rebuilding turn tracker"
                );
                TurnTracker::new(handle.path.clone())
            }
            None => {
                info!(path = %handle.path.display(), worktree = %worktree.display(), "tracking session log");
                TurnTracker::new(handle.path.clone())
            }
        };

        // Offset, counters and pending bytes agree after every chunk, so a deadline
        // can leave the tracker mid-read and the next poll resumes from it.
        let tracker = slot.tracker.insert(tracker);
        let read = tracker.read_to(size).await?;
        debug!(path = %handle.path.display(), read, offset = tracker.offset(), "advanced turn tracker");

        Ok(tracker.turn_info())
    }

    fn fallback_state(&self, slot: &mut KeySlot, coarse_status: CoarseSessionStatus) -> EyeState {
        if coarse_status != CoarseSessionStatus::Created {
            slot.created_since = None;
            return coarse_status.eye_state();
        }

        let since = *slot.created_since.get_or_insert_with(Instant::now);
        match self.options.created_timeout {
            Some(limit) if since.elapsed() >= limit => EyeState::Error,
            _ => EyeState::Generating,
        }
    }

    async fn locate(&self, roots: &[PathBuf], worktree: &Path) -> Result<Option<LogFileHandle>> {
        let roots = roots.to_vec();
        let worktree = worktree.to_path_buf();
        let extension = self.options.log_extension.clone();
        let cache = Arc::clone(&self.meta_cache);
        tokio::task::spawn_blocking(move || paths::locate(&roots, &worktree, &extension, &cache))
            .await?
    }

    /// Full display transcript of `session_id`, or `None` if no log matches.
    pub async fn read_transcript(
        &self,
        roots: &[PathBuf],
        session_id: &str,
    ) -> Result<Option<Vec<TranscriptMessage>>> {
        let read = transcript::read_transcript(roots, session_id, &self.options.log_extension);
        tokio::time::timeout(self.options.read_timeout, read)
            .await
            .map_err(|_| WatchError::Timeout(self.options.read_timeout))?
    }
}
