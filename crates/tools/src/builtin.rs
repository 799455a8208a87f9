//! Builtin tool set
//!
//! Tool names that must survive the speech cleaner are camelCase: markdown
//! stripping deletes underscores from spoken text, and a name echoed by the
//! model must not be mangled into a false sentinel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;
use tracing::info;

use parley_synth::VoiceState;

use crate::expr;
use crate::registry::ToolRegistry;
use crate::tool::{InputSchema, PropertySchema, Tool, ToolError, ToolSchema};

/// Marker the end-detection tool emits; the reasoning loop watches for it
pub const END_CONVERSATION_MARKER: &str = "END_CONVERSATION";

/// Phrases that signal the user wants to stop talking
const END_KEYWORDS: &[&str] = &[
    "再见", "拜拜", "bye", "goodbye", "退出", "结束", "关闭", "离开", "不聊了", "走了", "quit",
    "exit", "886", "88", "下线", "断开",
];

/// Whether a user utterance contains an end-of-conversation phrase
pub fn contains_end_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    END_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Registry with the full builtin tool set
pub fn builtin_registry(voices: Arc<VoiceState>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(TimeTool));
    registry.register(Arc::new(ConversationEndTool));
    registry.register(Arc::new(VoiceSelectorTool::new(voices)));
    registry
}

/// Math evaluation
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a math expression. Supports + - * / ^ %, sqrt, sin, cos, tan, \
         log, exp, abs, floor, ceil, round(x, digits), pow(x, y) and the \
         constants pi and e. Example: round(sqrt(2), 3)"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: InputSchema::object().property(
                "expression",
                PropertySchema::string("The math expression to evaluate"),
                true,
            ),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let expression = args["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidParams("expression must be a string".to_string()))?;

        expr::evaluate(expression)
            .map(expr::format_value)
            .map_err(ToolError::Execution)
    }
}

/// Wall-clock queries
pub struct TimeTool;

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "timeTool"
    }

    fn description(&self) -> &str {
        "Get the current time or date. query_type is one of: current_time, \
         current_date, weekday, full"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: InputSchema::object().property(
                "query_type",
                PropertySchema::enum_of(
                    "What to report",
                    &["current_time", "current_date", "weekday", "full"],
                ),
                true,
            ),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let query_type = args["query_type"].as_str().unwrap_or("full");
        let now = Local::now();
        let weekday = now.format("%A");

        let answer = match query_type {
            "current_time" => now.format("%H:%M:%S").to_string(),
            "current_date" => now.format("%Y-%m-%d").to_string(),
            "weekday" => weekday.to_string(),
            "full" => format!("{} {}", now.format("%Y-%m-%d %H:%M:%S"), weekday),
            other => {
                return Err(ToolError::InvalidParams(format!(
                    "unsupported query_type '{}'",
                    other
                )))
            }
        };
        Ok(answer)
    }
}

/// Detects whether the user asked to end the conversation
///
/// The model is instructed to call this instead of ever emitting an
/// end-of-conversation marker in spoken text.
pub struct ConversationEndTool;

#[async_trait]
impl Tool for ConversationEndTool {
    fn name(&self) -> &str {
        "detectConversationEnd"
    }

    fn description(&self) -> &str {
        "Check whether the user wants to end the conversation. Call this when \
         the user says goodbye, bye, quit, exit or similar farewells in any \
         language."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: InputSchema::object().property(
                "user_message",
                PropertySchema::string("The user's message to check"),
                true,
            ),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let message = args["user_message"].as_str().unwrap_or_default();

        if contains_end_keyword(message) {
            Ok(format!(
                "{}: the user wants to end the conversation",
                END_CONVERSATION_MARKER
            ))
        } else {
            Ok("CONTINUE: the user wants to keep talking".to_string())
        }
    }
}

/// Switches the synthesis voice to match the conversation language
///
/// Updates shared voice state atomically; segments already synthesized keep
/// their original voice, everything after the call uses the new one.
pub struct VoiceSelectorTool {
    voices: Arc<VoiceState>,
}

impl VoiceSelectorTool {
    pub fn new(voices: Arc<VoiceState>) -> Self {
        Self { voices }
    }
}

#[async_trait]
impl Tool for VoiceSelectorTool {
    fn name(&self) -> &str {
        "detectLanguageAndSelectVoice"
    }

    fn description(&self) -> &str {
        "Switch the speaking voice to match the conversation language. Call \
         this when the user changes language. Supported languages: chinese, \
         english, japanese, spanish, french, vietnamese."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: InputSchema::object()
                .property(
                    "language",
                    PropertySchema::enum_of(
                        "Target language",
                        &[
                            "chinese",
                            "english",
                            "japanese",
                            "spanish",
                            "french",
                            "vietnamese",
                        ],
                    ),
                    true,
                )
                .property(
                    "reason",
                    PropertySchema::string("Why the voice is being switched"),
                    false,
                ),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let language = args["language"].as_str().unwrap_or_default();
        let reason = args["reason"].as_str().unwrap_or("not given");

        match self.voices.select(language) {
            Some(voice) => {
                info!(language, voice = %voice.voice_id, reason, "voice switched");
                Ok(format!(
                    "voice switched to {} ({})",
                    voice.voice_id, voice.language
                ))
            }
            None => Err(ToolError::InvalidParams(format!(
                "unsupported language '{}'; supported: {}",
                language,
                VoiceState::supported_languages().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calculator_round_sqrt() {
        let result = CalculatorTool
            .invoke(serde_json::json!({"expression": "round(sqrt(2), 3)"}))
            .await
            .unwrap();
        assert_eq!(result, "1.414");
    }

    #[tokio::test]
    async fn test_calculator_rejects_garbage() {
        let err = CalculatorTool
            .invoke(serde_json::json!({"expression": "launch_missiles()"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_time_tool_formats() {
        let time = TimeTool
            .invoke(serde_json::json!({"query_type": "current_time"}))
            .await
            .unwrap();
        // HH:MM:SS
        assert_eq!(time.len(), 8);
        assert_eq!(time.matches(':').count(), 2);
    }

    #[tokio::test]
    async fn test_end_detector() {
        let result = ConversationEndTool
            .invoke(serde_json::json!({"user_message": "好的，再见！"}))
            .await
            .unwrap();
        assert!(result.starts_with(END_CONVERSATION_MARKER));

        let result = ConversationEndTool
            .invoke(serde_json::json!({"user_message": "再讲一个故事"}))
            .await
            .unwrap();
        assert!(result.starts_with("CONTINUE"));
    }

    #[tokio::test]
    async fn test_voice_selector_updates_state() {
        let voices = Arc::new(VoiceState::default());
        let tool = VoiceSelectorTool::new(voices.clone());

        tool.invoke(serde_json::json!({"language": "english", "reason": "user spoke English"}))
            .await
            .unwrap();
        assert_eq!(voices.current_voice_id(), "en-US-AriaNeural");

        let err = tool
            .invoke(serde_json::json!({"language": "latin"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry(Arc::new(VoiceState::default()));
        assert_eq!(
            registry.names(),
            vec![
                "calculator",
                "detectConversationEnd",
                "detectLanguageAndSelectVoice",
                "timeTool",
            ]
        );
        // No underscores: names must survive markdown stripping when echoed.
        for name in registry.names() {
            assert!(!name.contains('_'));
        }
    }

    #[test]
    fn test_end_keyword_scan() {
        assert!(contains_end_keyword("那就先这样，拜拜"));
        assert!(contains_end_keyword("ok BYE"));
        assert!(!contains_end_keyword("请再讲一个故事"));
    }
}
