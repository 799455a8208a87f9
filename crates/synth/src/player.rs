//! Audio playback seam
//!
//! `play` blocks until the device reports end-of-stream; `stop` preempts from
//! another thread. The pipeline calls `play` on the blocking pool so the
//! async runtime is never starved.

use std::io::Cursor;
use std::sync::mpsc;
use std::sync::Arc;

use rodio::Source;
use tracing::debug;

use crate::SynthError;

/// Blocking audio output
pub trait Player: Send + Sync {
    /// Play a decodable audio blob, blocking until it finishes or `stop` is called
    fn play(&self, samples: &[u8]) -> Result<(), SynthError>;

    /// Preempt the current playback and clear anything queued
    fn stop(&self);

    /// Whether audio is currently audible or queued
    fn is_playing(&self) -> bool;
}

/// OS audio output through a rodio sink
///
/// The output stream is owned by a dedicated thread: the stream handle is not
/// `Send`, while the sink is, so the sink is shared and the stream parks on
/// its own thread until the player is dropped.
pub struct RodioPlayer {
    sink: Arc<rodio::Sink>,
    shutdown: mpsc::Sender<()>,
}

impl RodioPlayer {
    pub fn new() -> Result<Self, SynthError> {
        let (init_tx, init_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let built = rodio::OutputStream::try_default()
                    .map_err(|e| SynthError::Playback(e.to_string()))
                    .and_then(|(stream, handle)| {
                        rodio::Sink::try_new(&handle)
                            .map(|sink| (stream, Arc::new(sink)))
                            .map_err(|e| SynthError::Playback(e.to_string()))
                    });

                match built {
                    Ok((_stream, sink)) => {
                        let _ = init_tx.send(Ok(sink));
                        // Keep the output stream alive until shutdown.
                        let _ = shutdown_rx.recv();
                        debug!("audio output thread exiting");
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| SynthError::Playback(e.to_string()))?;

        let sink = init_rx
            .recv()
            .map_err(|_| SynthError::Playback("audio output thread died".to_string()))??;

        Ok(Self {
            sink,
            shutdown: shutdown_tx,
        })
    }
}

impl Player for RodioPlayer {
    fn play(&self, samples: &[u8]) -> Result<(), SynthError> {
        if samples.is_empty() {
            return Ok(());
        }

        let cursor = Cursor::new(samples.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| SynthError::Decode(e.to_string()))?;

        self.sink.append(source.convert_samples::<f32>());
        self.sink.sleep_until_end();
        Ok(())
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}

impl Drop for RodioPlayer {
    fn drop(&mut self) {
        self.sink.stop();
        let _ = self.shutdown.send(());
    }
}

/// Player that discards audio instantly
///
/// Used when no output device is available and in tests that only care about
/// ordering, not sound.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl Player for NullPlayer {
    fn play(&self, _samples: &[u8]) -> Result<(), SynthError> {
        Ok(())
    }

    fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_player_is_silent() {
        let player = NullPlayer;
        assert!(player.play(b"AUDIO:anything").is_ok());
        assert!(!player.is_playing());
    }
}
