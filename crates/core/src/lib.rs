//! Core traits and types for the spoken-dialog agent
//!
//! This crate provides foundational types used across all other crates:
//! - Text segments and audio chunks flowing through the TTS pipeline
//! - Chat messages and conversation history
//! - Turn outcomes and metrics
//! - Pipeline statistics

pub mod message;
pub mod segment;
pub mod stats;
pub mod turn;

pub use message::{ChatMessage, ConversationHistory, FunctionCall, Role, ToolCallRequest};
pub use segment::{AudioChunk, ChunkStatus, TextSegment};
pub use stats::{PipelineStats, StatsHandle};
pub use turn::{ToolCallRecord, TurnMetrics, TurnOutcome};
