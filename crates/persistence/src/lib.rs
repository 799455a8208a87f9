//! Session persistence
//!
//! Conversation transcripts are written as JSON files, one per session,
//! atomically (write-temp-then-rename). The system prompt is never
//! persisted: it is re-supplied at load time so prompt edits take effect on
//! reload.

pub mod sessions;

pub use sessions::{FileSessionStore, SessionRecord, SessionStore};

use thiserror::Error;

/// Persistence errors
///
/// Save failures are logged and never fail a turn; only the supervisor's
/// startup path treats them as hard errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
