//! Scripted chat backend for tests and offline demos
//!
//! Each `stream_chat` call consumes the next scripted round and replays its
//! content fragments and tool calls as stream events. Requests are recorded
//! so tests can assert on what the loop actually sent.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::{ChatBackend, ChatEvent, ChatEventStream, ChatRequest, FunctionDelta, ToolCallDelta};
use crate::AgentError;

/// One scripted model response
#[derive(Debug, Clone, Default)]
pub struct ScriptedRound {
    pub content_fragments: Vec<String>,
    /// `(id, name, arguments)` per call
    pub tool_calls: Vec<(String, String, String)>,
    /// Pause before each fragment, to simulate a slow model
    pub fragment_delay: Option<Duration>,
}

impl ScriptedRound {
    /// Plain text, streamed in small fragments
    pub fn text(text: &str) -> Self {
        Self {
            content_fragments: fragment(text, 4),
            ..Default::default()
        }
    }

    /// Plain text streamed slowly
    pub fn slow_text(text: &str, fragment_delay: Duration) -> Self {
        Self {
            content_fragments: fragment(text, 4),
            fragment_delay: Some(fragment_delay),
            ..Default::default()
        }
    }

    /// A round that requests one tool call (optionally with leading text)
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            tool_calls: vec![(id.to_string(), name.to_string(), arguments.to_string())],
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.content_fragments = fragment(text, 4);
        self
    }

    pub fn with_tool_call(mut self, id: &str, name: &str, arguments: &str) -> Self {
        self.tool_calls
            .push((id.to_string(), name.to_string(), arguments.to_string()));
        self
    }
}

/// Split text into fragments of at most `size` characters
fn fragment(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Chat backend that replays scripted rounds
#[derive(Default)]
pub struct ScriptedChatBackend {
    rounds: Mutex<VecDeque<ScriptedRound>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatBackend {
    pub fn new(rounds: Vec<ScriptedRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append another round (for multi-turn tests)
    pub fn push_round(&self, round: ScriptedRound) {
        self.rounds.lock().push_back(round);
    }

    /// Every request the loop sent, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AgentError> {
        self.requests.lock().push(request);

        let round = self.rounds.lock().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            for fragment in round.content_fragments {
                if let Some(delay) = round.fragment_delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(ChatEvent::Content(fragment))).await.is_err() {
                    return;
                }
            }

            for (index, (id, name, arguments)) in round.tool_calls.into_iter().enumerate() {
                // Name first, then the arguments in two pieces, the way real
                // backends fragment calls.
                let first = ToolCallDelta {
                    index,
                    id: Some(id),
                    function: Some(FunctionDelta {
                        name: Some(name),
                        arguments: None,
                    }),
                };
                if tx.send(Ok(ChatEvent::ToolCall(first))).await.is_err() {
                    return;
                }

                let mid = arguments.len() / 2;
                let mid = (0..=mid)
                    .rev()
                    .find(|i| arguments.is_char_boundary(*i))
                    .unwrap_or(0);
                for piece in [&arguments[..mid], &arguments[mid..]] {
                    if piece.is_empty() {
                        continue;
                    }
                    let delta = ToolCallDelta {
                        index,
                        id: None,
                        function: Some(FunctionDelta {
                            name: None,
                            arguments: Some(piece.to_string()),
                        }),
                    };
                    if tx.send(Ok(ChatEvent::ToolCall(delta))).await.is_err() {
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(ChatEvent::Done)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
