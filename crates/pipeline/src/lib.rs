//! Streaming TTS pipeline
//!
//! Turns a stream of LLM output fragments into ordered, audible audio:
//! - Sentence splitting with content hygiene (markdown, URLs, sentinels)
//! - Bounded queues with backpressure (drop-oldest for text, blocking for audio)
//! - A synth worker pool with per-segment timeout and one transient retry
//! - An ordered player that tolerates out-of-order synthesis completion
//! - A shared interrupt for barge-in handling

pub mod interrupt;
pub mod pipeline;
mod playback;
pub mod splitter;
mod worker;

pub use interrupt::Interrupt;
pub use pipeline::StreamingTtsPipeline;
pub use splitter::{expand_acronyms, strip_markup, SentenceSplitter, SplitOutput};
