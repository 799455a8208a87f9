//! Ordered playback
//!
//! Chunks arrive in arbitrary completion order; this task restores strict
//! sequence order, skips failed chunks and dropped sequences, and plays
//! audio on the blocking pool so the runtime never stalls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{AudioChunk, ChunkStatus, StatsHandle};
use parley_synth::Player;

use crate::interrupt::Interrupt;

/// Sequences dropped before they reached the text queue
///
/// The player consults this set while advancing so a dropped segment never
/// leaves a hole it would wait on forever.
#[derive(Clone, Default)]
pub(crate) struct SkipSet {
    inner: Arc<Mutex<BTreeSet<(u64, u64)>>>,
    notify: Arc<Notify>,
}

impl SkipSet {
    pub fn insert(&self, turn: u64, sequence: u64) {
        self.inner.lock().insert((turn, sequence));
        self.notify.notify_one();
    }

    pub fn take(&self, turn: u64, sequence: u64) -> bool {
        self.inner.lock().remove(&(turn, sequence))
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

pub(crate) fn spawn_playback_loop(
    mut audio_rx: mpsc::Receiver<AudioChunk>,
    player: Arc<dyn Player>,
    stats: StatsHandle,
    interrupt: Interrupt,
    skips: SkipSet,
    play_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next_seq: u64 = 0;
        let mut current_turn: u64 = 0;
        let mut pending: BTreeMap<u64, AudioChunk> = BTreeMap::new();

        loop {
            let token = interrupt.watch();

            tokio::select! {
                _ = token.cancelled() => {
                    player.stop();
                    for _ in 0..pending.len() {
                        stats.audio_q_dec();
                    }
                    pending.clear();
                    loop {
                        match audio_rx.try_recv() {
                            Ok(_) => stats.audio_q_dec(),
                            Err(mpsc::error::TryRecvError::Empty) => break,
                            Err(mpsc::error::TryRecvError::Disconnected) => return,
                        }
                    }
                    next_seq = 0;
                    stats.set_playing(false);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    continue;
                }
                _ = skips.notified() => {}
                chunk = audio_rx.recv() => {
                    let Some(chunk) = chunk else { break };

                    if chunk.turn < current_turn {
                        // Straggler from an interrupted turn.
                        stats.audio_q_dec();
                        continue;
                    }
                    if chunk.turn > current_turn {
                        for _ in 0..pending.len() {
                            stats.audio_q_dec();
                        }
                        pending.clear();
                        next_seq = 0;
                        current_turn = chunk.turn;
                    }
                    pending.insert(chunk.sequence, chunk);
                }
            }

            // Advance in strict sequence order.
            loop {
                if token.is_cancelled() {
                    break;
                }
                if skips.take(current_turn, next_seq) {
                    debug!(sequence = next_seq, "skipping dropped segment");
                    next_seq += 1;
                    continue;
                }
                let Some(chunk) = pending.remove(&next_seq) else {
                    break;
                };

                match chunk.status {
                    ChunkStatus::Ok => {
                        stats.set_playing(true);
                        stats.audio_q_dec();
                        let played =
                            play_chunk(&player, chunk, &token, play_timeout, &stats).await;
                        stats.set_playing(false);
                        if played {
                            stats.incr_audio_played();
                        }
                    }
                    ChunkStatus::Failed => {
                        stats.audio_q_dec();
                        debug!(sequence = next_seq, "skipping failed chunk");
                    }
                }
                next_seq += 1;
            }
        }
    })
}

/// Play one chunk on the blocking pool, racing the interrupt and the
/// per-chunk timeout. Returns whether playback ran to completion.
async fn play_chunk(
    player: &Arc<dyn Player>,
    chunk: AudioChunk,
    token: &CancellationToken,
    play_timeout: Duration,
    stats: &StatsHandle,
) -> bool {
    let sequence = chunk.sequence;
    let started = Instant::now();

    let p = player.clone();
    let mut handle = tokio::task::spawn_blocking(move || p.play(&chunk.samples));

    let completed = tokio::select! {
        res = &mut handle => match res {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(sequence, error = %e, "playback failed");
                false
            }
            Err(e) => {
                warn!(sequence, error = %e, "playback task aborted");
                false
            }
        },
        _ = token.cancelled() => {
            player.stop();
            let _ = handle.await;
            false
        }
        _ = tokio::time::sleep(play_timeout) => {
            warn!(sequence, "playback timed out, aborting chunk");
            player.stop();
            let _ = handle.await;
            false
        }
    };

    stats.add_playback_ms(started.elapsed().as_millis() as u64);
    completed
}
