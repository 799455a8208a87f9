//! OpenAI-compatible streaming chat client
//!
//! Requests go to `{base_url}/chat/completions` with `stream: true`; the
//! response is server-sent events, one `data:` line per delta, terminated by
//! `data: [DONE]`. Deltas carry either content fragments or tool-call
//! fragments keyed by index.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use parley_config::ChatConfig;
use parley_core::ChatMessage;

use crate::AgentError;

/// One streaming chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    pub temperature: f32,
    pub stream: bool,
}

/// Fragment of a tool call, as streamed by the model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// One decoded stream event
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A fragment of assistant text
    Content(String),
    /// A fragment of a tool call
    ToolCall(ToolCallDelta),
    /// End of this response stream
    Done,
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent, AgentError>> + Send>>;

/// A chat endpoint that can stream one completion
///
/// The trait seam keeps the reasoning loop independent of HTTP, so tests
/// script whole conversations without a live endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AgentError>;
}

// Wire shapes for the SSE payloads.
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Reqwest-based client for any OpenAI-compatible endpoint
pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(cfg: &ChatConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_s))
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            client,
        })
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<reqwest::Response, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);

        // One retry for transient connect failures; mid-stream errors are
        // surfaced to the caller instead.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let err = AgentError::Api { status, body };
                    if err.is_transient() && attempt == 1 {
                        warn!(status, "chat request failed, retrying once");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    if attempt == 1 {
                        warn!(error = %e, "chat request failed, retrying once");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        continue;
                    }
                    return Err(AgentError::Http(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AgentError> {
        let response = self.send_request(&request).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(decode_sse(response, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Decode an SSE byte stream into chat events
///
/// `data:` lines may be split across network chunks, so a line buffer is
/// carried between reads.
async fn decode_sse(response: reqwest::Response, tx: mpsc::Sender<Result<ChatEvent, AgentError>>) {
    let mut body = response.bytes_stream();
    let mut line_buf = String::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(AgentError::Http(e.to_string()))).await;
                return;
            }
        };
        line_buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = line_buf.find('\n') {
            let line: String = line_buf.drain(..=pos).collect();
            let line = line.trim();

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();

            if payload == "[DONE]" {
                let _ = tx.send(Ok(ChatEvent::Done)).await;
                return;
            }

            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(parsed) => {
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty()
                                && tx.send(Ok(ChatEvent::Content(content))).await.is_err()
                            {
                                return;
                            }
                        }
                        if let Some(tool_calls) = choice.delta.tool_calls {
                            for delta in tool_calls {
                                if tx.send(Ok(ChatEvent::ToolCall(delta))).await.is_err() {
                                    return;
                                }
                            }
                        }
                        if choice.finish_reason.is_some() {
                            debug!(reason = ?choice.finish_reason, "chat stream finishing");
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(AgentError::Decode(format!("{}: {}", e, payload))))
                        .await;
                    return;
                }
            }
        }
    }

    // Stream ended without [DONE]; treat as a normal end.
    let _ = tx.send(Ok(ChatEvent::Done)).await;
}

/// Accumulates tool-call fragments into complete calls, keyed by index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
}

#[derive(Debug, Default, Clone)]
pub struct PendingCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, delta: ToolCallDelta) {
        if self.calls.len() <= delta.index {
            self.calls.resize_with(delta.index + 1, PendingCall::default);
        }
        let call = &mut self.calls[delta.index];

        if let Some(id) = delta.id {
            if !id.is_empty() {
                call.id = id;
            }
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                if !name.is_empty() {
                    call.name = name;
                }
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Completed calls in request order
    pub fn finish(self) -> Vec<PendingCall> {
        self.calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
