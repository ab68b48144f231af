//! src/audio/mod.rs
//!
//! Pre-encoded sound playback: the frame container reader, the shared
//! frame store, and the sequencer that streams it into a voice channel.

pub mod buffer;
pub mod dca;
pub mod sequencer;

pub use buffer::FrameBuffer;
pub use sequencer::{PlaybackReport, PlaybackSequencer, DEFAULT_SETTLE_DELAY};
