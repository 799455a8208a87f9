//! Configuration for the spoken-dialog agent
//!
//! Settings are layered: `config/default` file (optional), an optional named
//! environment file, then `PARLEY`-prefixed environment variables
//! (`PARLEY__CHAT__MODEL=...`). Every field has a serde default so a bare
//! environment still produces a runnable configuration.

mod settings;

pub use settings::{
    load_settings, ChatConfig, PipelineConfig, PromptsConfig, SessionConfig, Settings, TtsConfig,
    TtsProvider,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("missing required value: {0}")]
    Missing(String),
}
