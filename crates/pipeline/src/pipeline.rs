//! Pipeline assembly
//!
//! Owns the splitter, both queues, the worker pool and the player task, and
//! exposes the small surface the reasoning loop and supervisor drive:
//! `begin_turn`, `ingest`, `flush`, `interrupt_now`, `wait_idle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use parley_config::PipelineConfig;
use parley_core::{PipelineStats, StatsHandle, TextSegment};
use parley_synth::{Player, Synthesizer, VoiceState};

use crate::interrupt::Interrupt;
use crate::playback::{spawn_playback_loop, SkipSet};
use crate::splitter::{SentenceSplitter, SplitOutput};
use crate::worker::{spawn_generation_loop, WorkerConfig};

/// How long a text put may block before the segment is dropped
const TEXT_PUT_DEADLINE: Duration = Duration::from_millis(100);

/// Poll interval for drain checks
const IDLE_POLL: Duration = Duration::from_millis(25);

/// The streaming TTS pipeline
pub struct StreamingTtsPipeline {
    splitter: Mutex<SentenceSplitter>,
    text_tx: Mutex<Option<mpsc::Sender<TextSegment>>>,
    stats: StatsHandle,
    interrupt: Interrupt,
    skips: SkipSet,
    turn: AtomicU64,
    handles: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl StreamingTtsPipeline {
    /// Construct the pipeline and start its worker and player tasks
    pub fn new(
        cfg: &PipelineConfig,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        voices: Arc<VoiceState>,
        interrupt: Interrupt,
    ) -> Self {
        let (text_tx, text_rx) = mpsc::channel::<TextSegment>(cfg.text_q_size);
        let (audio_tx, audio_rx) = mpsc::channel(cfg.audio_q_size);

        let stats = StatsHandle::new();
        let skips = SkipSet::default();

        let gen = spawn_generation_loop(
            text_rx,
            audio_tx,
            synthesizer,
            voices,
            stats.clone(),
            interrupt.clone(),
            skips.clone(),
            WorkerConfig {
                max_tasks: cfg.max_tasks,
                gen_timeout: Duration::from_secs(cfg.gen_timeout_s),
                acronyms: Arc::new(cfg.acronyms.clone()),
            },
        );

        let play = spawn_playback_loop(
            audio_rx,
            player,
            stats.clone(),
            interrupt.clone(),
            skips.clone(),
            Duration::from_secs(cfg.play_timeout_s),
        );

        info!(
            text_q = cfg.text_q_size,
            audio_q = cfg.audio_q_size,
            max_tasks = cfg.max_tasks,
            "streaming TTS pipeline started"
        );

        Self {
            splitter: Mutex::new(SentenceSplitter::new(
                cfg.min_chunk,
                cfg.max_chunk,
                cfg.comma_split_threshold,
            )),
            text_tx: Mutex::new(Some(text_tx)),
            stats,
            interrupt,
            skips,
            turn: AtomicU64::new(0),
            handles: Mutex::new(Some((gen, play))),
        }
    }

    /// Re-arm the interrupt and start a fresh turn; sequences restart at 0
    pub fn begin_turn(&self) -> u64 {
        self.interrupt.rearm();
        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        self.splitter.lock().begin_turn(turn);
        self.skips.clear();
        turn
    }

    /// Feed one fragment of model output; returns whether an
    /// end-of-conversation sentinel was stripped
    pub async fn ingest(&self, fragment: &str) -> bool {
        let out = { self.splitter.lock().ingest(fragment) };
        self.dispatch(out).await
    }

    /// End the turn's text: emit whatever remains in the buffer
    pub async fn flush(&self) -> bool {
        let out = { self.splitter.lock().flush() };
        self.dispatch(out).await
    }

    async fn dispatch(&self, out: SplitOutput) -> bool {
        let tx = { self.text_tx.lock().clone() };

        for segment in out.segments {
            self.stats.incr_text_received();

            if self.interrupt.is_raised() {
                self.stats.incr_text_dropped();
                self.skips.insert(segment.turn, segment.sequence);
                continue;
            }

            let Some(tx) = &tx else {
                self.stats.incr_text_dropped();
                continue;
            };

            self.stats.text_q_inc();
            match tx.send_timeout(segment, TEXT_PUT_DEADLINE).await {
                Ok(()) => {}
                Err(mpsc::error::SendTimeoutError::Timeout(seg)) => {
                    // Backpressure: never block the reasoning loop; the
                    // dropped sentence still reaches the textual transcript.
                    self.stats.text_q_dec();
                    self.stats.incr_text_dropped();
                    self.skips.insert(seg.turn, seg.sequence);
                    debug!(sequence = seg.sequence, "text queue full, segment dropped");
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    self.stats.text_q_dec();
                    self.stats.incr_text_dropped();
                }
            }
        }

        out.saw_end_sentinel
    }

    /// Barge-in: stop playback, drop all queued work, clear the splitter
    ///
    /// Idempotent; the pipeline accepts a new turn immediately after.
    pub fn interrupt_now(&self) {
        self.interrupt.raise();
        self.splitter.lock().clear();
    }

    /// Shared interrupt handle
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Wait until nothing is queued, in flight, or audible
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stats.snapshot().is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Segments emitted by the splitter this turn
    pub fn segments_emitted(&self) -> u64 {
        self.splitter.lock().emitted()
    }

    pub fn splitter_buffer_is_empty(&self) -> bool {
        self.splitter.lock().buffer_is_empty()
    }

    /// Stop both tasks and release queue resources
    pub async fn shutdown(&self, timeout: Duration) {
        self.interrupt.raise();
        self.splitter.lock().clear();
        *self.text_tx.lock() = None;

        let handles = self.handles.lock().take();
        if let Some((gen, play)) = handles {
            let joined = tokio::time::timeout(timeout, async {
                let _ = gen.await;
                let _ = play.await;
            })
            .await;
            if joined.is_err() {
                debug!("pipeline tasks did not exit within the shutdown deadline");
            }
        }
        info!("streaming TTS pipeline stopped");
    }
}
