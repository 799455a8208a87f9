//! The transcriber seam
//!
//! Invoked once per user utterance, before the reasoning loop. Capture and
//! voice-activity detection happen upstream of this interface.

use async_trait::async_trait;

use crate::SynthError;

/// Result of transcribing one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// Detected language, when the backend reports one
    pub language: Option<String>,
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language_hint: Option<&str>,
    ) -> Result<Transcript, SynthError>;
}
