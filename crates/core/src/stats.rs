//! Pipeline statistics
//!
//! Counters are monotonic except the queue depths and the playing flag.
//! [`StatsHandle`] is the shared, lock-free writer side; [`PipelineStats`] is
//! a point-in-time snapshot handed to callers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Inner {
    text_received: AtomicU64,
    text_dropped: AtomicU64,
    audio_generated: AtomicU64,
    audio_failed: AtomicU64,
    audio_played: AtomicU64,
    text_q_depth: AtomicU64,
    audio_q_depth: AtomicU64,
    active_workers: AtomicU64,
    is_playing: AtomicBool,
    generation_ms: AtomicU64,
    playback_ms: AtomicU64,
}

/// Shared writer handle for pipeline counters
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<Inner>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_text_received(&self) {
        self.inner.text_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_text_dropped(&self) {
        self.inner.text_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_audio_generated(&self) {
        self.inner.audio_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_audio_failed(&self) {
        self.inner.audio_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_audio_played(&self) {
        self.inner.audio_played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn text_q_inc(&self) {
        self.inner.text_q_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn text_q_dec(&self) {
        decrement(&self.inner.text_q_depth);
    }

    pub fn text_q_reset(&self) {
        self.inner.text_q_depth.store(0, Ordering::Relaxed);
    }

    pub fn audio_q_inc(&self) {
        self.inner.audio_q_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audio_q_dec(&self) {
        decrement(&self.inner.audio_q_depth);
    }

    pub fn audio_q_reset(&self) {
        self.inner.audio_q_depth.store(0, Ordering::Relaxed);
    }

    pub fn workers_inc(&self) {
        self.inner.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn workers_dec(&self) {
        decrement(&self.inner.active_workers);
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.is_playing.store(playing, Ordering::Relaxed);
    }

    pub fn add_generation_ms(&self, ms: u64) {
        self.inner.generation_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn add_playback_ms(&self, ms: u64) {
        self.inner.playback_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of all counters
    pub fn snapshot(&self) -> PipelineStats {
        let i = &self.inner;
        PipelineStats {
            text_received: i.text_received.load(Ordering::Relaxed),
            text_dropped: i.text_dropped.load(Ordering::Relaxed),
            audio_generated: i.audio_generated.load(Ordering::Relaxed),
            audio_failed: i.audio_failed.load(Ordering::Relaxed),
            audio_played: i.audio_played.load(Ordering::Relaxed),
            text_q_depth: i.text_q_depth.load(Ordering::Relaxed),
            audio_q_depth: i.audio_q_depth.load(Ordering::Relaxed),
            active_workers: i.active_workers.load(Ordering::Relaxed),
            is_playing: i.is_playing.load(Ordering::Relaxed),
            generation_ms: i.generation_ms.load(Ordering::Relaxed),
            playback_ms: i.playback_ms.load(Ordering::Relaxed),
        }
    }
}

fn decrement(counter: &AtomicU64) {
    // Saturating: a racing reset must not underflow the gauge.
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

/// Running pipeline counters
///
/// `audio_q_depth` counts chunks buffered anywhere between synthesis and
/// playback, the reorder map included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub text_received: u64,
    pub text_dropped: u64,
    pub audio_generated: u64,
    pub audio_failed: u64,
    pub audio_played: u64,
    pub text_q_depth: u64,
    pub audio_q_depth: u64,
    pub active_workers: u64,
    pub is_playing: bool,
    pub generation_ms: u64,
    pub playback_ms: u64,
}

impl PipelineStats {
    /// True when nothing is queued, in flight, or audible
    pub fn is_idle(&self) -> bool {
        self.text_q_depth == 0
            && self.audio_q_depth == 0
            && self.active_workers == 0
            && !self.is_playing
    }
}
