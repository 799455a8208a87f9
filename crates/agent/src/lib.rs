//! Reasoning engine
//!
//! Drives an OpenAI-compatible chat model through multi-round tool calling,
//! forwarding assistant text to the TTS pipeline as it streams.

pub mod chat;
pub mod reasoning;
pub mod scripted;

pub use chat::{
    ChatBackend, ChatEvent, ChatEventStream, ChatRequest, OpenAiChatClient, ToolCallDelta,
};
pub use reasoning::{new_draft, ReasoningConfig, ReasoningLoop, SharedDraft, TurnDraft, TurnReport};
pub use scripted::{ScriptedChatBackend, ScriptedRound};

use thiserror::Error;

/// Chat and reasoning errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("http error: {0}")]
    Http(String),

    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("stream decode error: {0}")]
    Decode(String),

    #[error("chat stream ended unexpectedly")]
    StreamClosed,
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Http(_) => true,
            AgentError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
