//! Synth worker pool
//!
//! One dispatch loop pulls segments off the text queue and spawns a task per
//! segment, bounded by a semaphore. Completion order is arbitrary; the
//! playback side restores sequence order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{AudioChunk, StatsHandle, TextSegment};
use parley_synth::{Synthesizer, VoiceState};

use crate::interrupt::Interrupt;
use crate::playback::SkipSet;
use crate::splitter::expand_acronyms;

/// Rough speech-time estimate used for chunk metadata
fn estimate_duration_ms(text: &str) -> u64 {
    text.chars().count() as u64 * 80
}

pub(crate) struct WorkerConfig {
    pub max_tasks: usize,
    pub gen_timeout: Duration,
    pub acronyms: Arc<Vec<(String, String)>>,
}

pub(crate) fn spawn_generation_loop(
    mut text_rx: mpsc::Receiver<TextSegment>,
    audio_tx: mpsc::Sender<AudioChunk>,
    synthesizer: Arc<dyn Synthesizer>,
    voices: Arc<VoiceState>,
    stats: StatsHandle,
    interrupt: Interrupt,
    skips: SkipSet,
    cfg: WorkerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(cfg.max_tasks));
        let acronyms = cfg.acronyms;

        loop {
            let token = interrupt.watch();
            tokio::select! {
                _ = token.cancelled() => {
                    // Interrupted: discard queued text until the supervisor
                    // re-arms for the next turn.
                    loop {
                        match text_rx.try_recv() {
                            Ok(_) => stats.text_q_dec(),
                            Err(mpsc::error::TryRecvError::Empty) => break,
                            Err(mpsc::error::TryRecvError::Disconnected) => return,
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                segment = text_rx.recv() => {
                    let Some(segment) = segment else { break };
                    stats.workers_inc();
                    stats.text_q_dec();

                    let permit = tokio::select! {
                        _ = token.cancelled() => {
                            stats.workers_dec();
                            continue;
                        }
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(p) => p,
                            Err(_) => {
                                stats.workers_dec();
                                break;
                            }
                        },
                    };

                    let audio_tx = audio_tx.clone();
                    let synthesizer = synthesizer.clone();
                    let voices = voices.clone();
                    let stats = stats.clone();
                    let token = token.clone();
                    let skips = skips.clone();
                    let acronyms = acronyms.clone();
                    let gen_timeout = cfg.gen_timeout;

                    tokio::spawn(async move {
                        let _permit = permit;
                        let turn = segment.turn;
                        let sequence = segment.sequence;
                        let chunk = synthesize_segment(
                            segment,
                            synthesizer.as_ref(),
                            &voices,
                            &stats,
                            &token,
                            gen_timeout,
                            &acronyms,
                        )
                        .await;

                        match chunk {
                            Some(chunk) if !token.is_cancelled() => {
                                // Audio is never dropped: block until a queue
                                // slot frees, bounded by the generation timeout.
                                stats.audio_q_inc();
                                let sent = tokio::select! {
                                    _ = token.cancelled() => false,
                                    res = tokio::time::timeout(gen_timeout, audio_tx.send(chunk)) => {
                                        matches!(res, Ok(Ok(())))
                                    }
                                };
                                if !sent {
                                    // Leave no hole for the player to wait on.
                                    stats.audio_q_dec();
                                    skips.insert(turn, sequence);
                                    debug!(sequence, "audio chunk abandoned");
                                }
                            }
                            _ => debug!(sequence, "synthesis abandoned after interrupt"),
                        }
                        stats.workers_dec();
                    });
                }
            }
        }
    })
}

/// Synthesize one segment: expand acronyms, enforce the per-segment timeout,
/// retry once on transient failure, and always produce a chunk for the
/// player unless the turn was interrupted.
async fn synthesize_segment(
    segment: TextSegment,
    synthesizer: &dyn Synthesizer,
    voices: &VoiceState,
    stats: &StatsHandle,
    token: &CancellationToken,
    gen_timeout: Duration,
    acronyms: &[(String, String)],
) -> Option<AudioChunk> {
    let spoken = expand_acronyms(&segment.text, acronyms);
    let voice = voices.current_voice_id();
    let started = Instant::now();

    let mut attempt = 0;
    let result = loop {
        attempt += 1;

        let res = tokio::select! {
            _ = token.cancelled() => return None,
            res = tokio::time::timeout(gen_timeout, synthesizer.synthesize(&spoken, &voice)) => {
                res.unwrap_or(Err(parley_synth::SynthError::Timeout))
            }
        };

        match res {
            Ok(bytes) => break Ok(bytes),
            Err(e) if e.is_transient() && attempt == 1 => {
                warn!(sequence = segment.sequence, error = %e, "synthesis failed, retrying once");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(e) => break Err(e),
        }
    };

    let chunk = match result {
        Ok(bytes) => {
            stats.incr_audio_generated();
            stats.add_generation_ms(started.elapsed().as_millis() as u64);
            AudioChunk::ok(
                segment.turn,
                segment.sequence,
                bytes,
                estimate_duration_ms(&spoken),
            )
        }
        Err(e) => {
            stats.incr_audio_failed();
            warn!(sequence = segment.sequence, error = %e, "synthesis failed");
            AudioChunk::failed(segment.turn, segment.sequence)
        }
    };

    Some(chunk)
}
