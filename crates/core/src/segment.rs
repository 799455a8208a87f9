//! Units flowing through the streaming TTS pipeline

/// A synthesizable unit of text emitted by the sentence splitter
///
/// Sequences are dense from 0 within a turn. The `turn` epoch lets the
/// long-lived playback task reset its ordering state between turns and
/// discard chunks that survived a barge-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub turn: u64,
    pub sequence: u64,
    pub text: String,
    /// Marks the last segment of a turn
    pub is_final: bool,
}

/// Synthesis outcome for one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Ok,
    Failed,
}

/// Synthesized audio for one [`TextSegment`]
///
/// Failed chunks carry empty samples but keep their sequence so the ordered
/// player never stalls waiting on a gap.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub turn: u64,
    pub sequence: u64,
    /// Opaque audio blob in the synthesizer's declared format
    pub samples: Vec<u8>,
    pub duration_ms: u64,
    pub status: ChunkStatus,
}

impl AudioChunk {
    pub fn ok(turn: u64, sequence: u64, samples: Vec<u8>, duration_ms: u64) -> Self {
        Self {
            turn,
            sequence,
            samples,
            duration_ms,
            status: ChunkStatus::Ok,
        }
    }

    pub fn failed(turn: u64, sequence: u64) -> Self {
        Self {
            turn,
            sequence,
            samples: Vec::new(),
            duration_ms: 0,
            status: ChunkStatus::Failed,
        }
    }
}
