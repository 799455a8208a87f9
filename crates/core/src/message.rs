//! Chat messages and conversation history
//!
//! Message shapes follow the OpenAI chat-completion convention so they can be
//! sent on the wire and persisted without translation.

use serde::{Deserialize, Serialize};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallRequest {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus raw JSON arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a raw JSON string, exactly as the model produced them
    pub arguments: String,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// Ordered conversation history
///
/// Invariants maintained by the mutation methods:
/// - the first message is always the single system prompt
/// - tool messages directly follow the assistant message that requested them
/// - no two consecutive user messages without an intervening assistant message
///
/// History is mutated only through the turn-commit path; readers take a
/// snapshot via [`ConversationHistory::messages`].
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    /// Create a history seeded with the system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Full message list, system prompt included
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Snapshot of the full message list
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    /// Messages after the system prompt (the persisted portion)
    pub fn non_system(&self) -> &[ChatMessage] {
        &self.messages[1..]
    }

    /// Replace everything after the system prompt, dropping any leading
    /// system messages the restored data may carry
    pub fn restore(&mut self, messages: Vec<ChatMessage>) {
        self.messages.truncate(1);
        self.messages
            .extend(messages.into_iter().filter(|m| m.role != Role::System));
    }

    /// Whether a user message may be appended without breaking ordering
    pub fn accepts_user(&self) -> bool {
        !matches!(self.messages.last().map(|m| m.role), Some(Role::User))
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        debug_assert!(self.accepts_user(), "consecutive user messages");
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Append an already-built message (assistant-with-tools or tool result)
    pub fn push_message(&mut self, message: ChatMessage) {
        debug_assert!(message.role != Role::System, "only one system message");
        self.messages.push(message);
    }

    /// Number of user turns recorded
    pub fn turn_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_starts_with_system() {
        let history = ConversationHistory::new("You are helpful.");
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.non_system().len(), 0);
    }

    #[test]
    fn test_restore_drops_system_messages() {
        let mut history = ConversationHistory::new("prompt");
        history.restore(vec![
            ChatMessage::system("stale prompt"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[0].content, "prompt");
        assert_eq!(history.turn_count(), 1);
    }

    #[test]
    fn test_accepts_user_guard() {
        let mut history = ConversationHistory::new("prompt");
        assert!(history.accepts_user());

        history.push_user("first");
        assert!(!history.accepts_user());

        history.push_assistant("reply");
        assert!(history.accepts_user());
    }

    #[test]
    fn test_message_serialization_shape() {
        let msg = ChatMessage::tool("call_1", "42");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }
}
