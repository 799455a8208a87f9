//! Synthesizer, transcriber and player adapters
//!
//! The core pipeline only sees the traits in this crate; concrete vendors sit
//! behind thin HTTP adapters and can be swapped through configuration.

pub mod azure;
pub mod openai;
pub mod player;
pub mod synthesizer;
pub mod transcriber;
pub mod voice;

pub use azure::AzureSynthesizer;
pub use openai::{OpenAiSynthesizer, OpenAiTranscriber};
pub use player::{NullPlayer, Player, RodioPlayer};
pub use synthesizer::{build_synthesizer, AudioFormat, StubSynthesizer, Synthesizer};
pub use transcriber::{Transcriber, Transcript};
pub use voice::{Voice, VoiceState};

use thiserror::Error;

/// Synthesis and playback errors
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("http error: {0}")]
    Http(String),

    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("synthesis timed out")]
    Timeout,

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SynthError {
    /// Whether a retry could plausibly succeed
    ///
    /// Connection failures and 5xx responses are transient; 4xx responses and
    /// malformed input are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SynthError::Http(_) | SynthError::Timeout => true,
            SynthError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
