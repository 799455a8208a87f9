//! Session supervision
//!
//! One `Session` owns a chat session end-to-end: the reasoning loop, the
//! streaming TTS pipeline, conversation history and its persistence. Turns
//! run under deadlines and always resolve to an outcome; no error crosses a
//! turn boundary.

pub mod prompt;
pub mod supervisor;

pub use prompt::load_system_prompt;
pub use supervisor::{Session, SessionParts, SessionState, TurnResult};

use thiserror::Error;

/// Session errors
///
/// These surface only outside turns: construction, transcription and calls
/// against an ended session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session has ended")]
    Ended,

    #[error("synthesizer setup failed: {0}")]
    Synth(#[from] parley_synth::SynthError),

    #[error("chat client setup failed: {0}")]
    Chat(#[from] parley_agent::AgentError),

    #[error("transcription failed: {0}")]
    Transcription(String),
}
