//! agent-eye: turn status and transcripts for background coding agents
//!
//! Follows the session logs that agents append to, without owning the agent
//! processes. See [`sessions::TurnService`] for the entry points.

mod error;
mod event;
mod session;

pub use error::*;
pub use event::*;
pub use session::*;

pub mod config;
pub mod ipc;
pub mod server;
pub mod sessions;
