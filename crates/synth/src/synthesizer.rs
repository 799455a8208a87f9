//! The synthesizer seam
//!
//! `synthesize` turns one text segment into an opaque audio blob. The
//! pipeline never parses the blob; it hands it to the player as-is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::{TtsConfig, TtsProvider};

use crate::{AzureSynthesizer, OpenAiSynthesizer, SynthError};

/// Declared format of the synthesizer's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MP3, mono
    Mp3 { sample_rate: u32 },
    /// PCM WAV, mono
    Wav { sample_rate: u32 },
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given voice, returning a decodable audio blob
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthError>;

    /// Format of the blobs this synthesizer produces
    fn format(&self) -> AudioFormat;
}

/// Build a synthesizer from configuration
pub fn build_synthesizer(cfg: &TtsConfig) -> Result<Arc<dyn Synthesizer>, SynthError> {
    let synthesizer: Arc<dyn Synthesizer> = match cfg.provider {
        TtsProvider::Openai => Arc::new(OpenAiSynthesizer::new(cfg)?),
        TtsProvider::Azure | TtsProvider::Edge => Arc::new(AzureSynthesizer::new(cfg)?),
    };
    Ok(synthesizer)
}

/// Scriptable synthesizer for tests and offline runs
///
/// Returns fabricated bytes derived from the input text after an optional
/// delay, and can be told to fail specific calls. Every call is logged so
/// tests can assert on the voice in effect at synthesis time.
#[derive(Default)]
pub struct StubSynthesizer {
    delay: Option<Duration>,
    slow_matching: parking_lot::Mutex<Vec<(String, Duration)>>,
    fail_on: parking_lot::Mutex<Vec<usize>>,
    fail_matching: parking_lot::Mutex<Vec<String>>,
    calls: parking_lot::Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
}

impl StubSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every synthesis call by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay calls whose text contains `substring`
    pub fn delay_matching(self, substring: impl Into<String>, delay: Duration) -> Self {
        self.slow_matching.lock().push((substring.into(), delay));
        self
    }

    /// Fail the n-th call (0-based) with a transient error
    pub fn fail_call(self, n: usize) -> Self {
        self.fail_on.lock().push(n);
        self
    }

    /// Fail every call whose text contains `substring`
    pub fn fail_matching(self, substring: impl Into<String>) -> Self {
        self.fail_matching.lock().push(substring.into());
        self
    }

    /// `(text, voice_id)` pairs in invocation order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .push((text.to_string(), voice_id.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let extra = self
            .slow_matching
            .lock()
            .iter()
            .find(|(s, _)| text.contains(s))
            .map(|(_, d)| *d);
        if let Some(extra) = extra {
            tokio::time::sleep(extra).await;
        }

        if self.fail_on.lock().contains(&n)
            || self.fail_matching.lock().iter().any(|s| text.contains(s))
        {
            return Err(SynthError::Http("stubbed failure".to_string()));
        }

        Ok(format!("AUDIO:{}", text).into_bytes())
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Wav { sample_rate: 24_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_records_voice() {
        let stub = StubSynthesizer::new();
        stub.synthesize("hello", "en-US-AriaNeural").await.unwrap();

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "en-US-AriaNeural");
    }

    #[tokio::test]
    async fn test_stub_scripted_failure() {
        let stub = StubSynthesizer::new().fail_call(0);
        let err = stub.synthesize("hello", "v").await.unwrap_err();
        assert!(err.is_transient());

        // Subsequent calls succeed.
        assert!(stub.synthesize("again", "v").await.is_ok());
    }
}
