//! Tool-calling reasoning loop
//!
//! One turn drives the model through up to `max_rounds` streaming requests.
//! Assistant text is forwarded to the TTS pipeline as it streams; tool calls
//! are dispatched sequentially between rounds. The loop never returns an
//! error: every exit path resolves to a turn outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use parley_core::{ChatMessage, ToolCallRecord, ToolCallRequest, TurnOutcome};
use parley_pipeline::{strip_markup, StreamingTtsPipeline};
use parley_tools::{contains_end_keyword, ToolRegistry, END_CONVERSATION_MARKER};

use crate::chat::{ChatBackend, ChatEvent, ChatRequest, ToolCallAccumulator};

/// Reasoning loop configuration
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub model: String,
    pub temperature: f32,
    /// Hard cap on chat rounds per turn
    pub max_rounds: usize,
    /// Per-tool-call deadline
    pub tool_timeout: Duration,
    /// Spoken when a turn cannot complete
    pub apology: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.0,
            max_rounds: 5,
            tool_timeout: Duration::from_secs(10),
            apology: "Sorry, please say that again.".to_string(),
        }
    }
}

/// Turn state shared with the supervisor
///
/// The supervisor aborts a timed-out turn by dropping its future, so
/// everything needed to commit a consistent history prefix lives here, not
/// in loop-local variables.
#[derive(Debug, Clone, Default)]
pub struct TurnDraft {
    pub user_text: String,
    /// Accumulates across rounds as content streams
    pub assistant_text: String,
    /// Assistant-with-tools and tool messages from completed rounds
    pub committed: Vec<ChatMessage>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub should_end: bool,
    pub rounds: usize,
}

pub type SharedDraft = Arc<Mutex<TurnDraft>>;

pub fn new_draft(user_text: &str) -> SharedDraft {
    Arc::new(Mutex::new(TurnDraft {
        user_text: user_text.to_string(),
        ..Default::default()
    }))
}

/// How a finished (non-aborted) turn resolved
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub assistant_text: String,
    pub tool_call_count: usize,
    pub rounds: usize,
    pub should_end: bool,
}

/// The reasoning loop
pub struct ReasoningLoop {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    cfg: ReasoningConfig,
}

impl ReasoningLoop {
    pub fn new(backend: Arc<dyn ChatBackend>, registry: Arc<ToolRegistry>, cfg: ReasoningConfig) -> Self {
        Self {
            backend,
            registry,
            cfg,
        }
    }

    /// Run one turn against the model
    ///
    /// `history` is a snapshot of the conversation including the system
    /// prompt; history itself is only mutated by the commit path after the
    /// turn resolves.
    pub async fn run_turn(
        &self,
        history: Vec<ChatMessage>,
        user_text: &str,
        pipeline: &StreamingTtsPipeline,
        draft: &SharedDraft,
    ) -> TurnReport {
        draft.lock().user_text = user_text.to_string();

        let mut messages = history;
        let mut sent_user = user_text.to_string();
        if contains_end_keyword(user_text) {
            debug!("end keyword detected in user input");
            sent_user.push_str(
                "\n\n[system note: the user may be ending the conversation; \
                 call detectConversationEnd]",
            );
        }
        messages.push(ChatMessage::user(sent_user));

        let descriptors = self.registry.descriptors();
        let mut should_end = false;
        // Barge-in: the shared interrupt cancels the turn at the next await.
        let token = pipeline.interrupt_handle().watch();

        for round in 1..=self.cfg.max_rounds {
            if token.is_cancelled() {
                return self.cancel_turn(draft, should_end);
            }
            draft.lock().rounds = round;

            let request = ChatRequest {
                model: self.cfg.model.clone(),
                messages: messages.clone(),
                tools: Some(descriptors.clone()),
                temperature: self.cfg.temperature,
                stream: true,
            };

            let mut stream = match self.backend.stream_chat(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, round, "chat request failed");
                    return self.fail_turn(pipeline, draft, should_end).await;
                }
            };

            let mut accumulator = ToolCallAccumulator::new();
            let mut round_text = String::new();

            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => {
                        info!(round, "turn cancelled by barge-in");
                        return self.cancel_turn(draft, should_end);
                    }
                    event = stream.next() => event,
                };
                let Some(event) = event else { break };
                match event {
                    Ok(ChatEvent::Content(fragment)) => {
                        round_text.push_str(&fragment);
                        // The transcript carries the cleaned form, so it
                        // matches what the splitter will actually speak.
                        draft
                            .lock()
                            .assistant_text
                            .push_str(&strip_markup(&fragment));
                        if pipeline.ingest(&fragment).await {
                            should_end = true;
                            draft.lock().should_end = true;
                        }
                    }
                    Ok(ChatEvent::ToolCall(delta)) => accumulator.add(delta),
                    Ok(ChatEvent::Done) => break,
                    Err(e) => {
                        error!(error = %e, round, "chat stream failed");
                        return self.fail_turn(pipeline, draft, should_end).await;
                    }
                }
            }

            let calls = accumulator.finish();
            if calls.is_empty() {
                if pipeline.flush().await {
                    should_end = true;
                    draft.lock().should_end = true;
                }

                let d = draft.lock();
                debug!(rounds = round, chars = d.assistant_text.len(), "turn complete");
                return TurnReport {
                    outcome: TurnOutcome::Completed,
                    assistant_text: d.assistant_text.clone(),
                    tool_call_count: d.tool_calls.len(),
                    rounds: round,
                    should_end,
                };
            }

            // Tool round: record the requesting assistant message, then
            // dispatch each call in the order the model asked.
            let calls: Vec<(String, crate::chat::PendingCall)> = calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| {
                    let id = if call.id.is_empty() {
                        format!("call_{}_{}", round, i)
                    } else {
                        call.id.clone()
                    };
                    (id, call)
                })
                .collect();

            let tool_requests: Vec<ToolCallRequest> = calls
                .iter()
                .map(|(id, call)| ToolCallRequest::function(id, &call.name, &call.arguments))
                .collect();
            let assistant_msg = ChatMessage::assistant_with_tools(round_text.clone(), tool_requests);
            messages.push(assistant_msg.clone());
            draft.lock().committed.push(assistant_msg);

            for (id, call) in &calls {
                let result = self
                    .registry
                    .dispatch(&call.name, &call.arguments, self.cfg.tool_timeout)
                    .await;

                info!(tool = %call.name, ok = !result.starts_with("ERROR:"), "tool call");
                if call.name == "detectConversationEnd" && result.contains(END_CONVERSATION_MARKER)
                {
                    should_end = true;
                    draft.lock().should_end = true;
                }

                {
                    let mut d = draft.lock();
                    d.tool_calls.push(ToolCallRecord {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: result.clone(),
                        ok: !result.starts_with("ERROR:"),
                    });
                }

                let tool_msg = ChatMessage::tool(id, &result);
                messages.push(tool_msg.clone());
                draft.lock().committed.push(tool_msg);
            }
        }

        warn!(max_rounds = self.cfg.max_rounds, "round cap exceeded");
        self.fail_turn(pipeline, draft, should_end).await
    }

    /// Resolve a turn cancelled by barge-in; the user is already speaking,
    /// so nothing more is said
    fn cancel_turn(&self, draft: &SharedDraft, should_end: bool) -> TurnReport {
        let d = draft.lock();
        TurnReport {
            outcome: TurnOutcome::Cancelled,
            assistant_text: d.assistant_text.clone(),
            tool_call_count: d.tool_calls.len(),
            rounds: d.rounds,
            should_end,
        }
    }

    /// Resolve a turn as failed, speaking the fixed apology so the user
    /// never gets dead air
    async fn fail_turn(
        &self,
        pipeline: &StreamingTtsPipeline,
        draft: &SharedDraft,
        should_end: bool,
    ) -> TurnReport {
        pipeline.ingest(&self.cfg.apology).await;
        pipeline.flush().await;

        let d = draft.lock();
        TurnReport {
            outcome: TurnOutcome::Failed,
            assistant_text: d.assistant_text.clone(),
            tool_call_count: d.tool_calls.len(),
            rounds: d.rounds,
            should_end,
        }
    }
}
