//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Chat-model endpoint configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsConfig,

    /// Streaming pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Session supervisor configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Prompt sources
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Settings {
    /// Validate settings, failing fast on values that would only surface as
    /// confusing runtime errors later
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.model.trim().is_empty() {
            return Err(ConfigError::Missing("chat.model".to_string()));
        }

        if self.chat.base_url.trim().is_empty() && self.chat.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(
                "chat.api_key (required when chat.base_url is unset)".to_string(),
            ));
        }

        if matches!(self.tts.provider, TtsProvider::Azure | TtsProvider::Openai)
            && self.tts.api_key.trim().is_empty()
        {
            return Err(ConfigError::Missing(format!(
                "tts.api_key (required for provider {:?})",
                self.tts.provider
            )));
        }

        if self.pipeline.text_q_size == 0 || self.pipeline.audio_q_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.text_q_size/audio_q_size".to_string(),
                message: "queue capacities must be at least 1".to_string(),
            });
        }

        if self.pipeline.max_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_tasks".to_string(),
                message: "worker limit must be at least 1".to_string(),
            });
        }

        if self.pipeline.max_chunk <= self.pipeline.min_chunk {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_chunk".to_string(),
                message: format!(
                    "must exceed pipeline.min_chunk ({})",
                    self.pipeline.min_chunk
                ),
            });
        }

        Ok(())
    }
}

/// Chat-model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL; the default targets a local Ollama
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    /// Bearer API key; local endpoints accept a placeholder
    #[serde(default = "default_chat_api_key")]
    pub api_key: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Whole-request timeout in seconds
    #[serde(default = "default_chat_timeout")]
    pub timeout_s: u64,
}

fn default_chat_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_chat_api_key() -> String {
    "ollama".to_string()
}
fn default_chat_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_chat_timeout() -> u64 {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key: default_chat_api_key(),
            model: default_chat_model(),
            temperature: 0.0,
            timeout_s: default_chat_timeout(),
        }
    }
}

/// TTS service provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Edge,
    Azure,
    Openai,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: TtsProvider,

    /// Default voice id; tools may switch it at runtime
    #[serde(default = "default_tts_voice")]
    pub voice: String,

    /// Speaking rate, e.g. "+15%"
    #[serde(default = "default_tts_rate")]
    pub rate: String,

    /// Volume adjustment, e.g. "+10%"
    #[serde(default = "default_tts_volume")]
    pub volume: String,

    #[serde(default)]
    pub api_key: String,

    /// Azure region, used to derive the endpoint for the azure provider
    #[serde(default = "default_tts_region")]
    pub region: String,

    /// Explicit endpoint override; empty means the provider default
    #[serde(default)]
    pub base_url: String,

    /// Model for the openai provider
    #[serde(default = "default_tts_model")]
    pub model: String,
}

fn default_tts_provider() -> TtsProvider {
    TtsProvider::Edge
}
fn default_tts_voice() -> String {
    "zh-CN-XiaoxiaoNeural".to_string()
}
fn default_tts_rate() -> String {
    "+15%".to_string()
}
fn default_tts_volume() -> String {
    "+10%".to_string()
}
fn default_tts_region() -> String {
    "eastasia".to_string()
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            voice: default_tts_voice(),
            rate: default_tts_rate(),
            volume: default_tts_volume(),
            api_key: String::new(),
            region: default_tts_region(),
            base_url: String::new(),
            model: default_tts_model(),
        }
    }
}

/// Streaming pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Text queue capacity
    #[serde(default = "default_text_q_size")]
    pub text_q_size: usize,

    /// Audio queue capacity
    #[serde(default = "default_audio_q_size")]
    pub audio_q_size: usize,

    /// Maximum concurrent synthesis requests
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Minimum segment length in characters
    #[serde(default = "default_min_chunk")]
    pub min_chunk: usize,

    /// Maximum segment length in characters
    #[serde(default = "default_max_chunk")]
    pub max_chunk: usize,

    /// Length past which a comma becomes an acceptable split point
    #[serde(default = "default_comma_split")]
    pub comma_split_threshold: usize,

    /// Per-segment synthesis timeout in seconds
    #[serde(default = "default_gen_timeout")]
    pub gen_timeout_s: u64,

    /// Per-chunk playback timeout in seconds
    #[serde(default = "default_play_timeout")]
    pub play_timeout_s: u64,

    /// Acronym pronunciation table, applied on word boundaries
    #[serde(default = "default_acronyms")]
    pub acronyms: Vec<(String, String)>,
}

fn default_text_q_size() -> usize {
    15
}
fn default_audio_q_size() -> usize {
    10
}
fn default_max_tasks() -> usize {
    50
}
fn default_min_chunk() -> usize {
    3
}
fn default_max_chunk() -> usize {
    150
}
fn default_comma_split() -> usize {
    40
}
fn default_gen_timeout() -> u64 {
    15
}
fn default_play_timeout() -> u64 {
    30
}
fn default_acronyms() -> Vec<(String, String)> {
    [
        ("AI", "A I"),
        ("API", "A P I"),
        ("URL", "U R L"),
        ("TTS", "text to speech"),
        ("LLM", "large language model"),
        ("GPU", "G P U"),
        ("CPU", "C P U"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_q_size: default_text_q_size(),
            audio_q_size: default_audio_q_size(),
            max_tasks: default_max_tasks(),
            min_chunk: default_min_chunk(),
            max_chunk: default_max_chunk(),
            comma_split_threshold: default_comma_split(),
            gen_timeout_s: default_gen_timeout(),
            play_timeout_s: default_play_timeout(),
            acronyms: default_acronyms(),
        }
    }
}

/// Session supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Deadline for the reasoning loop to finish its last assistant token
    #[serde(default = "default_reasoning_timeout")]
    pub reasoning_timeout_s: u64,

    /// Deadline for the pipeline to drain after reasoning returns
    #[serde(default = "default_tts_wait_timeout")]
    pub tts_wait_timeout_s: u64,

    /// Per-tool-call deadline
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_s: u64,

    /// Directory for persisted session records
    #[serde(default = "default_persist_dir")]
    pub persist_dir: String,
}

fn default_reasoning_timeout() -> u64 {
    60
}
fn default_tts_wait_timeout() -> u64 {
    30
}
fn default_tool_timeout() -> u64 {
    10
}
fn default_persist_dir() -> String {
    "sessions/".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reasoning_timeout_s: default_reasoning_timeout(),
            tts_wait_timeout_s: default_tts_wait_timeout(),
            tool_timeout_s: default_tool_timeout(),
            persist_dir: default_persist_dir(),
        }
    }
}

/// Prompt sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Path to the system prompt; a built-in default is used when absent
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: String,
}

fn default_system_prompt_path() -> String {
    "prompts/system_prompt.txt".to_string()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_prompt_path: default_system_prompt_path(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`PARLEY` prefix, `__` separator)
/// 2. `config/{env}` (if an environment name is given)
/// 3. `config/default`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pipeline.text_q_size, 15);
        assert_eq!(settings.pipeline.audio_q_size, 10);
        assert_eq!(settings.session.reasoning_timeout_s, 60);
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut settings = Settings::default();
        settings.pipeline.audio_q_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_paid_provider_requires_key() {
        let mut settings = Settings::default();
        settings.tts.provider = TtsProvider::Openai;
        assert!(settings.validate().is_err());

        settings.tts.api_key = "sk-test".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_chunk_bounds_ordering() {
        let mut settings = Settings::default();
        settings.pipeline.min_chunk = 200;
        assert!(settings.validate().is_err());
    }
}
