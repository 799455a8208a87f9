//! The session supervisor
//!
//! Owns one chat session end-to-end: accepts user utterances, runs the
//! reasoning loop under a deadline, waits for audio to drain under a second
//! deadline, commits history, persists, and cleans up on every exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use parley_agent::{
    new_draft, ChatBackend, OpenAiChatClient, ReasoningConfig, ReasoningLoop, TurnDraft,
};
use parley_config::Settings;
use parley_core::{ConversationHistory, PipelineStats, TurnMetrics, TurnOutcome};
use parley_persistence::{FileSessionStore, SessionRecord, SessionStore};
use parley_pipeline::{Interrupt, StreamingTtsPipeline};
use parley_synth::{
    build_synthesizer, OpenAiTranscriber, Player, RodioPlayer, Synthesizer, Transcriber, VoiceState,
};
use parley_tools::builtin_registry;

use crate::prompt::load_system_prompt;
use crate::SessionError;

/// Supervisor lifecycle state
///
/// Every exit from `TurnInProgress` returns to `Started`, success or
/// failure; `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    TurnInProgress,
    Ended,
}

/// Result of one turn
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// The assistant's accumulated text (transcript form, pre-expansion)
    pub response: String,
    pub metrics: TurnMetrics,
    /// The session should end once this turn is done
    pub should_end: bool,
    pub stats: PipelineStats,
}

/// Everything a session is assembled from
///
/// Production wiring comes from [`Session::from_settings`]; tests inject
/// scripted backends, stub synthesizers and recording players here.
pub struct SessionParts {
    pub settings: Settings,
    pub backend: Arc<dyn ChatBackend>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub player: Arc<dyn Player>,
    pub store: Option<Arc<dyn SessionStore>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

/// One chat session
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    model_id: String,
    state: Mutex<SessionState>,
    history: RwLock<ConversationHistory>,
    pipeline: StreamingTtsPipeline,
    reasoning: ReasoningLoop,
    voices: Arc<VoiceState>,
    store: Option<Arc<dyn SessionStore>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    reasoning_timeout: Duration,
    tts_wait_timeout: Duration,
    play_timeout: Duration,
    turn_counter: AtomicU64,
    metrics: Mutex<Vec<TurnMetrics>>,
}

impl Session {
    /// Assemble a session from explicit parts
    pub fn assemble(parts: SessionParts) -> Self {
        let settings = parts.settings;
        let created_at = Utc::now();

        let voices = Arc::new(VoiceState::new(settings.tts.voice.clone()));
        let registry = Arc::new(builtin_registry(voices.clone()));

        let interrupt = Interrupt::new();
        let pipeline = StreamingTtsPipeline::new(
            &settings.pipeline,
            parts.synthesizer,
            parts.player,
            voices.clone(),
            interrupt,
        );

        let reasoning = ReasoningLoop::new(
            parts.backend,
            registry,
            ReasoningConfig {
                model: settings.chat.model.clone(),
                temperature: settings.chat.temperature,
                tool_timeout: Duration::from_secs(settings.session.tool_timeout_s),
                ..ReasoningConfig::default()
            },
        );

        let system_prompt = load_system_prompt(&settings.prompts.system_prompt_path);

        Self {
            id: SessionRecord::make_session_id(created_at),
            created_at,
            model_id: settings.chat.model.clone(),
            state: Mutex::new(SessionState::Idle),
            history: RwLock::new(ConversationHistory::new(system_prompt)),
            pipeline,
            reasoning,
            voices,
            store: parts.store,
            transcriber: parts.transcriber,
            reasoning_timeout: Duration::from_secs(settings.session.reasoning_timeout_s),
            tts_wait_timeout: Duration::from_secs(settings.session.tts_wait_timeout_s),
            play_timeout: Duration::from_secs(settings.pipeline.play_timeout_s),
            turn_counter: AtomicU64::new(0),
            metrics: Mutex::new(Vec::new()),
        }
    }

    /// Assemble a session with production adapters built from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, SessionError> {
        let player: Arc<dyn Player> = Arc::new(RodioPlayer::new()?);
        Self::from_settings_with_player(settings, player)
    }

    /// Production adapters with an explicit player (headless runs use a
    /// silent one)
    pub fn from_settings_with_player(
        settings: &Settings,
        player: Arc<dyn Player>,
    ) -> Result<Self, SessionError> {
        let backend: Arc<dyn ChatBackend> = Arc::new(OpenAiChatClient::new(&settings.chat)?);
        let synthesizer = build_synthesizer(&settings.tts)?;
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(settings.session.persist_dir.clone()));
        let transcriber: Arc<dyn Transcriber> = Arc::new(OpenAiTranscriber::new(
            settings.chat.base_url.clone(),
            settings.chat.api_key.clone(),
            "whisper-1",
        )?);

        Ok(Self::assemble(SessionParts {
            settings: settings.clone(),
            backend,
            synthesizer,
            player,
            store: Some(store),
            transcriber: Some(transcriber),
        }))
    }

    /// Mark the session started
    pub fn start(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Idle {
            *state = SessionState::Started;
            info!(session_id = %self.id, model = %self.model_id, "session started");
        }
    }

    /// Restore the newest persisted conversation, if any
    pub async fn restore_latest(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        match store.load_latest().await {
            Ok(Some(record)) => {
                let turns = record.turns;
                self.history.write().restore(record.conversation_history);
                info!(turns, "conversation history restored");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to restore history, starting fresh");
                false
            }
        }
    }

    /// Run one turn from user text
    ///
    /// Never fails once the session is live: every outcome maps onto a
    /// [`TurnOutcome`].
    pub async fn chat(&self, user_text: &str) -> Result<TurnResult, SessionError> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Ended => return Err(SessionError::Ended),
                SessionState::Idle => {
                    info!(session_id = %self.id, "session started");
                }
                _ => {}
            }
            *state = SessionState::TurnInProgress;
        }

        let started = Instant::now();
        let turn_id = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.pipeline.begin_turn();
        let draft = new_draft(user_text);

        info!(turn_id, user = %truncate(user_text, 60), "turn started");

        let snapshot = { self.history.read().snapshot() };
        let run = self
            .reasoning
            .run_turn(snapshot, user_text, &self.pipeline, &draft);

        let (outcome, should_end, speak_apology) =
            match tokio::time::timeout(self.reasoning_timeout, run).await {
                Ok(report) => match report.outcome {
                    TurnOutcome::Completed => {
                        if self.pipeline.wait_idle(self.tts_wait_timeout).await {
                            (TurnOutcome::Completed, report.should_end, false)
                        } else {
                            // The reply text is complete; only audio is cut.
                            warn!(turn_id, "audio drain timed out");
                            self.pipeline.interrupt_now();
                            (TurnOutcome::TimedOut, report.should_end, true)
                        }
                    }
                    TurnOutcome::Cancelled => {
                        // Barge-in: queues are already cleared and the user
                        // is speaking, so nothing more is said.
                        (TurnOutcome::Cancelled, report.should_end, false)
                    }
                    outcome => {
                        // The loop spoke its own apology on failure.
                        let _ = self.pipeline.wait_idle(self.tts_wait_timeout).await;
                        (outcome, report.should_end, false)
                    }
                },
                Err(_) => {
                    warn!(turn_id, timeout_s = self.reasoning_timeout.as_secs(), "reasoning timed out");
                    self.pipeline.interrupt_now();
                    let should_end = draft.lock().should_end;
                    (TurnOutcome::TimedOut, should_end, true)
                }
            };

        // Commit history now that the turn's final text is known.
        let draft_snapshot = draft.lock().clone();
        {
            let mut history = self.history.write();
            commit_turn(&mut history, &draft_snapshot, outcome);
        }

        if speak_apology {
            self.speak_apology().await;
        }

        if matches!(outcome, TurnOutcome::Completed | TurnOutcome::TimedOut) {
            self.persist().await;
        }

        *self.state.lock() = SessionState::Started;

        let metrics = TurnMetrics {
            duration_ms: started.elapsed().as_millis() as u64,
            tool_call_count: draft_snapshot.tool_calls.len(),
            outcome,
        };
        self.metrics.lock().push(metrics);

        info!(
            turn_id,
            outcome = %outcome,
            duration_ms = metrics.duration_ms,
            tool_calls = metrics.tool_call_count,
            "turn finished"
        );

        if should_end {
            info!("conversation end requested");
            self.end();
        }

        Ok(TurnResult {
            outcome,
            response: draft_snapshot.assistant_text,
            metrics,
            should_end,
            stats: self.pipeline.stats(),
        })
    }

    /// Run one turn from a recorded utterance
    pub async fn chat_audio(&self, audio: Vec<u8>) -> Result<TurnResult, SessionError> {
        let Some(transcriber) = &self.transcriber else {
            return Err(SessionError::Transcription(
                "no transcriber configured".to_string(),
            ));
        };

        let transcript = transcriber
            .transcribe(audio, None)
            .await
            .map_err(|e| SessionError::Transcription(e.to_string()))?;

        info!(text = %truncate(&transcript.text, 60), language = ?transcript.language, "utterance transcribed");
        self.chat(&transcript.text).await
    }

    /// Barge-in: the user started speaking while the agent was talking
    pub fn interrupt(&self) {
        info!("barge-in, interrupting current turn");
        self.pipeline.interrupt_now();
    }

    /// Mark the session ended; subsequent `chat` calls fail
    pub fn end(&self) {
        *self.state.lock() = SessionState::Ended;
        info!(session_id = %self.id, "session ended");
    }

    /// Stop pipeline tasks, release audio resources, persist one last time
    pub async fn shutdown(&self) {
        info!(session_id = %self.id, "session shutting down");
        self.pipeline.interrupt_now();
        self.pipeline.shutdown(self.play_timeout).await;
        self.persist().await;
        *self.state.lock() = SessionState::Ended;
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn session_id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn turn_metrics(&self) -> Vec<TurnMetrics> {
        self.metrics.lock().clone()
    }

    pub fn voices(&self) -> &Arc<VoiceState> {
        &self.voices
    }

    /// Messages currently in history, system prompt included
    pub fn history_snapshot(&self) -> Vec<parley_core::ChatMessage> {
        self.history.read().snapshot()
    }

    async fn speak_apology(&self) {
        self.pipeline.begin_turn();
        self.pipeline.ingest(APOLOGY).await;
        self.pipeline.flush().await;
        let _ = self.pipeline.wait_idle(Duration::from_secs(5)).await;
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let record = {
            let history = self.history.read();
            SessionRecord {
                session_id: self.id.clone(),
                created_at: self.created_at,
                model_id: self.model_id.clone(),
                turns: history.turn_count(),
                conversation_history: history.non_system().to_vec(),
            }
        };

        // A save failure never fails a turn.
        if let Err(e) = store.save(&record).await {
            warn!(error = %e, "session save failed, continuing");
        }
    }
}

/// Spoken on timeout so the user never gets dead air
const APOLOGY: &str = "Sorry, please say that again.";

/// Append a finished turn to history
///
/// Completed and timed-out turns keep their committed tool rounds and, when
/// at least one character was produced, the final assistant text. Failed and
/// cancelled turns leave no trace, matching what the user actually heard
/// being abandoned.
fn commit_turn(history: &mut ConversationHistory, draft: &TurnDraft, outcome: TurnOutcome) {
    if !matches!(outcome, TurnOutcome::Completed | TurnOutcome::TimedOut) {
        debug!(outcome = %outcome, "turn not committed to history");
        return;
    }

    let final_text = draft.assistant_text.trim();
    if draft.committed.is_empty() && final_text.is_empty() {
        debug!("turn produced nothing committable");
        return;
    }

    if !history.accepts_user() {
        warn!("history would have consecutive user messages, skipping commit");
        return;
    }

    history.push_user(&draft.user_text);
    for message in &draft.committed {
        history.push_message(message.clone());
    }
    if !final_text.is_empty() {
        history.push_assistant(final_text);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ChatMessage;

    fn draft(user: &str, assistant: &str) -> TurnDraft {
        TurnDraft {
            user_text: user.to_string(),
            assistant_text: assistant.to_string(),
            ..TurnDraft::default()
        }
    }

    #[test]
    fn test_commit_completed_turn() {
        let mut history = ConversationHistory::new("prompt");
        commit_turn(&mut history, &draft("hi", "hello"), TurnOutcome::Completed);

        assert_eq!(history.turn_count(), 1);
        assert_eq!(history.non_system().len(), 2);
    }

    #[test]
    fn test_commit_skips_failed_turn() {
        let mut history = ConversationHistory::new("prompt");
        commit_turn(&mut history, &draft("hi", "partial"), TurnOutcome::Failed);
        assert_eq!(history.non_system().len(), 0);
    }

    #[test]
    fn test_commit_keeps_timed_out_prefix() {
        let mut history = ConversationHistory::new("prompt");
        commit_turn(
            &mut history,
            &draft("讲个故事", "从前有座山，山里"),
            TurnOutcome::TimedOut,
        );

        assert_eq!(history.turn_count(), 1);
        let last = history.messages().last().unwrap();
        assert!(last.content.contains("从前有座山"));
    }

    #[test]
    fn test_commit_drops_empty_turn_entirely() {
        let mut history = ConversationHistory::new("prompt");
        commit_turn(&mut history, &draft("hi", "   "), TurnOutcome::TimedOut);
        // No dangling user message that would break message ordering.
        assert_eq!(history.non_system().len(), 0);
    }

    #[test]
    fn test_commit_orders_tool_rounds_before_final_text() {
        let mut history = ConversationHistory::new("prompt");
        let mut d = draft("几点了", "现在是14:30:25。");
        d.committed = vec![
            ChatMessage::assistant_with_tools(
                String::new(),
                vec![parley_core::ToolCallRequest::function(
                    "call_1",
                    "timeTool",
                    r#"{"query_type":"current_time"}"#,
                )],
            ),
            ChatMessage::tool("call_1", "14:30:25"),
        ];
        commit_turn(&mut history, &d, TurnOutcome::Completed);

        let roles: Vec<_> = history.non_system().iter().map(|m| m.role).collect();
        use parley_core::Role::*;
        assert_eq!(roles, vec![User, Assistant, Tool, Assistant]);
    }
}
