//! OpenAI-compatible speech adapters
//!
//! `/audio/speech` for synthesis and `/audio/transcriptions` for the ASR
//! seam. The same shapes are served by several providers, so `base_url` is
//! configurable.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::TtsConfig;
use serde::Deserialize;

use crate::{AudioFormat, SynthError, Synthesizer, Transcriber, Transcript};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible `/audio/speech` client
pub struct OpenAiSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiSynthesizer {
    pub fn new(cfg: &TtsConfig) -> Result<Self, SynthError> {
        if cfg.api_key.trim().is_empty() {
            return Err(SynthError::Config("tts.api_key is required".to_string()));
        }

        let base_url = if cfg.base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            cfg.base_url.trim_end_matches('/').to_string()
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SynthError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice_id,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthError::Api { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3 { sample_rate: 24_000 }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// OpenAI-compatible `/audio/transcriptions` client
pub struct OpenAiTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SynthError> {
        let base_url = base_url.into();
        let base_url = if base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SynthError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language_hint: Option<&str>,
    ) -> Result<Transcript, SynthError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file = reqwest::multipart::Part::bytes(audio)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| SynthError::Http(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if let Some(hint) = language_hint {
            form = form.text("language", hint.to_string());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SynthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthError::Api { status, body });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SynthError::Decode(e.to_string()))?;

        Ok(Transcript {
            text: parsed.text,
            language: parsed.language,
        })
    }
}
