//! Tools for the spoken-dialog agent
//!
//! Implements the function-calling tool protocol (name, description, JSON
//! schema, invoke) plus the builtin tool set: calculator, time, conversation
//! end detection and voice selection.

pub mod builtin;
mod expr;
pub mod registry;
pub mod tool;

pub use builtin::{
    builtin_registry, contains_end_keyword, CalculatorTool, ConversationEndTool, TimeTool,
    VoiceSelectorTool, END_CONVERSATION_MARKER,
};
pub use registry::ToolRegistry;
pub use tool::{InputSchema, PropertySchema, Tool, ToolError, ToolSchema};
