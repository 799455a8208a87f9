//! Integration tests for the reasoning loop
//!
//! Scripted chat rounds drive the loop against the real builtin registry
//! and a stub pipeline, covering tool dispatch, error feedback, the round
//! cap and voice switching.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{new_draft, ReasoningConfig, ReasoningLoop, ScriptedChatBackend, ScriptedRound};
use parley_config::PipelineConfig;
use parley_core::{Role, TurnOutcome};
use parley_pipeline::{Interrupt, StreamingTtsPipeline};
use parley_synth::{NullPlayer, Player, StubSynthesizer, Synthesizer, VoiceState};
use parley_tools::builtin_registry;

struct Fixture {
    pipeline: StreamingTtsPipeline,
    synthesizer: Arc<StubSynthesizer>,
    voices: Arc<VoiceState>,
}

fn fixture() -> Fixture {
    let synthesizer = Arc::new(StubSynthesizer::new());
    let voices = Arc::new(VoiceState::default());
    let pipeline = StreamingTtsPipeline::new(
        &PipelineConfig::default(),
        synthesizer.clone() as Arc<dyn Synthesizer>,
        Arc::new(NullPlayer) as Arc<dyn Player>,
        voices.clone(),
        Interrupt::new(),
    );
    Fixture {
        pipeline,
        synthesizer,
        voices,
    }
}

fn make_loop(backend: Arc<ScriptedChatBackend>, voices: Arc<VoiceState>) -> ReasoningLoop {
    let registry = Arc::new(builtin_registry(voices));
    let cfg = ReasoningConfig {
        model: "test-model".to_string(),
        ..ReasoningConfig::default()
    };
    ReasoningLoop::new(backend, registry, cfg)
}

fn history() -> Vec<parley_core::ChatMessage> {
    vec![parley_core::ChatMessage::system("You are a helpful voice assistant.")]
}

#[tokio::test]
async fn test_tool_round_then_answer() {
    let f = fixture();
    let backend = Arc::new(ScriptedChatBackend::new(vec![
        ScriptedRound::tool_call(
            "call_1",
            "calculator",
            r#"{"expression": "round(sqrt(2), 3)"}"#,
        ),
        ScriptedRound::text("根号2约等于1.414。"),
    ]));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("计算 sqrt(2) 保留 3 位小数");
    let report = reasoning
        .run_turn(history(), "计算 sqrt(2) 保留 3 位小数", &f.pipeline, &draft)
        .await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.tool_call_count, 1);
    assert!(report.assistant_text.contains("1.414"));
    assert!(!report.should_end);

    // The tool result went back to the model as a tool message.
    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let tool_msg = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool message in second round");
    assert_eq!(tool_msg.content, "1.414");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));

    // The spoken reply reached the synthesizer.
    assert!(f.pipeline.wait_idle(Duration::from_secs(5)).await);
    let stats = f.pipeline.stats();
    assert!(stats.audio_generated >= 1);

    // The voice never changed during a pure calculation.
    for (_, voice) in f.synthesizer.calls() {
        assert_eq!(voice, "zh-CN-XiaoxiaoNeural");
    }

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unknown_tool_feeds_error_back() {
    let f = fixture();
    let backend = Arc::new(ScriptedChatBackend::new(vec![
        ScriptedRound::tool_call("call_1", "missingTool", "{}"),
        ScriptedRound::text("好的。"),
    ]));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("test");
    let report = reasoning.run_turn(history(), "test", &f.pipeline, &draft).await;

    // The loop recovers: the error goes back to the model and the next
    // round completes the turn.
    assert_eq!(report.outcome, TurnOutcome::Completed);

    let requests = backend.requests();
    let tool_msg = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(tool_msg.content.starts_with("ERROR:"));
    assert!(tool_msg.content.contains("missingTool"));

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_round_cap_fails_turn_with_apology() {
    let f = fixture();
    // The model keeps asking for tools and never produces a final answer.
    let rounds = (0..6)
        .map(|i| {
            ScriptedRound::tool_call(
                &format!("call_{}", i),
                "calculator",
                r#"{"expression": "1 + 1"}"#,
            )
        })
        .collect();
    let backend = Arc::new(ScriptedChatBackend::new(rounds));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("loop forever");
    let report = reasoning
        .run_turn(history(), "loop forever", &f.pipeline, &draft)
        .await;

    assert_eq!(report.outcome, TurnOutcome::Failed);
    assert_eq!(report.rounds, 5);
    assert_eq!(backend.requests().len(), 5);

    // The apology was spoken instead of dead air.
    assert!(f.pipeline.wait_idle(Duration::from_secs(5)).await);
    let spoken: Vec<String> = f.synthesizer.calls().into_iter().map(|(t, _)| t).collect();
    assert!(spoken.iter().any(|t| t.contains("Sorry")));

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_voice_switch_applies_before_next_segment() {
    let f = fixture();
    let backend = Arc::new(ScriptedChatBackend::new(vec![
        ScriptedRound::tool_call(
            "call_1",
            "detectLanguageAndSelectVoice",
            r#"{"language": "english", "reason": "user asked in English"}"#,
        ),
        ScriptedRound::text("Sure, I will speak English now!"),
    ]));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("Hello, please switch to English");
    let report = reasoning
        .run_turn(history(), "Hello, please switch to English", &f.pipeline, &draft)
        .await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(f.pipeline.wait_idle(Duration::from_secs(5)).await);

    // Every segment synthesized after the tool call used the new voice.
    let calls = f.synthesizer.calls();
    assert!(!calls.is_empty());
    for (_, voice) in calls {
        assert_eq!(voice, "en-US-AriaNeural");
    }

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_sentinel_in_content_sets_should_end_and_is_never_spoken() {
    let f = fixture();
    let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::text(
        "好的，再见！(END_CONVERSATION)",
    )]));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("再见");
    let report = reasoning.run_turn(history(), "再见", &f.pipeline, &draft).await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(report.should_end);

    assert!(f.pipeline.wait_idle(Duration::from_secs(5)).await);
    for (text, _) in f.synthesizer.calls() {
        assert!(!text.to_uppercase().contains("CONVERSATION"));
    }

    // The raw assistant text still carries what the model produced.
    assert!(report.assistant_text.contains("再见"));

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_end_tool_result_sets_should_end() {
    let f = fixture();
    let backend = Arc::new(ScriptedChatBackend::new(vec![
        ScriptedRound::tool_call(
            "call_1",
            "detectConversationEnd",
            r#"{"user_message": "再见"}"#,
        ),
        ScriptedRound::text("好的，再见！"),
    ]));
    let reasoning = make_loop(backend.clone(), f.voices.clone());

    f.pipeline.begin_turn();
    let draft = new_draft("再见");
    let report = reasoning.run_turn(history(), "再见", &f.pipeline, &draft).await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(report.should_end);

    // The user message also carried the end-keyword nudge.
    let first = &backend.requests()[0];
    let user_msg = first.messages.iter().rfind(|m| m.role == Role::User).unwrap();
    assert!(user_msg.content.contains("detectConversationEnd"));

    f.pipeline.shutdown(Duration::from_secs(1)).await;
}
