//! System prompt loading
//!
//! The prompt lives in a plain text file so it can be edited without a
//! rebuild; the built-in default keeps the agent usable out of the box.

use std::path::Path;

use tracing::{info, warn};

/// Default system prompt used when no prompt file is configured
const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a voice assistant. Your replies are spoken aloud, so follow these rules strictly:

1. Keep replies short and conversational, at most a few sentences.
2. Plain speakable text only: no markdown, no code blocks, no emoji, no links or URLs.
3. Never write any marker containing END or CONVERSATION in your reply text.
4. When the user says goodbye, bye, quit or a similar farewell in any language, \
call the detectConversationEnd tool, then reply with a short farewell.
5. When the user switches language, call detectLanguageAndSelectVoice before replying, \
then answer in that language. Keep the voice until the language changes again.
6. Use the calculator tool for any arithmetic, even trivial sums, and the timeTool \
for any date or time question. Never guess.
7. Answer in the user's language.";

/// Load the system prompt from `path`, falling back to the built-in default
pub fn load_system_prompt(path: &str) -> String {
    if path.trim().is_empty() {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    }

    match std::fs::read_to_string(Path::new(path)) {
        Ok(text) if !text.trim().is_empty() => {
            info!(path, "system prompt loaded");
            text.trim().to_string()
        }
        Ok(_) => {
            warn!(path, "system prompt file is empty, using built-in default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            info!(path, error = %e, "no system prompt file, using built-in default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back() {
        let prompt = load_system_prompt("no/such/prompt.txt");
        assert!(prompt.contains("voice assistant"));
    }

    #[test]
    fn test_default_never_mentions_sentinel_verbatim() {
        // The prompt must not itself contain a strippable sentinel.
        let upper = DEFAULT_SYSTEM_PROMPT.to_uppercase();
        assert!(!upper.contains("END_CONVERSATION"));
        assert!(!upper.contains("ENDCONVERSATION"));
    }
}
