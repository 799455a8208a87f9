//! Azure/Edge speech adapter
//!
//! Both providers take the same SSML request body; they differ in endpoint
//! and authentication. The `edge` provider targets a configured endpoint
//! without a subscription key.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::{TtsConfig, TtsProvider};

use crate::{AudioFormat, SynthError, Synthesizer};

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// SSML-over-REST speech client
pub struct AzureSynthesizer {
    endpoint: String,
    api_key: Option<String>,
    rate: String,
    volume: String,
    client: reqwest::Client,
}

impl AzureSynthesizer {
    pub fn new(cfg: &TtsConfig) -> Result<Self, SynthError> {
        let endpoint = if !cfg.base_url.trim().is_empty() {
            cfg.base_url.trim_end_matches('/').to_string()
        } else {
            match cfg.provider {
                TtsProvider::Azure => format!(
                    "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                    cfg.region
                ),
                _ => {
                    return Err(SynthError::Config(
                        "tts.base_url is required for the edge provider".to_string(),
                    ))
                }
            }
        };

        let api_key = match cfg.provider {
            TtsProvider::Azure => {
                if cfg.api_key.trim().is_empty() {
                    return Err(SynthError::Config("tts.api_key is required".to_string()));
                }
                Some(cfg.api_key.clone())
            }
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SynthError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key,
            rate: cfg.rate.clone(),
            volume: cfg.volume.clone(),
            client,
        })
    }

    fn build_ssml(&self, text: &str, voice_id: &str) -> String {
        let lang = voice_language(voice_id);
        format!(
            "<speak version='1.0' xml:lang='{lang}'>\
             <voice name='{voice}'>\
             <prosody rate='{rate}' volume='{volume}'>{text}</prosody>\
             </voice></speak>",
            lang = lang,
            voice = voice_id,
            rate = self.rate,
            volume = self.volume,
            text = escape_xml(text),
        )
    }
}

#[async_trait]
impl Synthesizer for AzureSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(self.build_ssml(text, voice_id));

        if let Some(key) = &self.api_key {
            request = request.header("Ocp-Apim-Subscription-Key", key);
        }

        let response = request
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

/// Derive the SSML language tag from a voice id like `zh-CN-XiaoxiaoNeural`
fn voice_language(voice_id: &str) -> String {
    let mut parts = voice_id.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) if !lang.is_empty() && !region.is_empty() => {
            format!("{}-{}", lang, region)
        }
        _ => "en-US".to_string(),
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_language() {
        assert_eq!(voice_language("zh-CN-XiaoxiaoNeural"), "zh-CN");
        assert_eq!(voice_language("en-US-AriaNeural"), "en-US");
        assert_eq!(voice_language("bogus"), "en-US");
    }

    #[test]
    fn test_ssml_escapes_text() {
        let cfg = TtsConfig {
            provider: TtsProvider::Azure,
            api_key: "key".to_string(),
            ..TtsConfig::default()
        };
        let synth = AzureSynthesizer::new(&cfg).unwrap();
        let ssml = synth.build_ssml("a < b & c", "en-US-AriaNeural");

        assert!(ssml.contains("a &lt; b &amp; c"));
        assert!(ssml.contains("xml:lang='en-US'"));
    }

    #[test]
    fn test_edge_requires_endpoint() {
        let cfg = TtsConfig::default();
        assert!(matches!(
            AzureSynthesizer::new(&cfg),
            Err(SynthError::Config(_))
        ));
    }
}
