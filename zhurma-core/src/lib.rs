// src/lib.rs

pub mod audio;
pub mod config;
pub mod eventbus;
pub mod platforms;
pub mod presence;
pub mod services;
pub mod test_utils;

pub use zhurma_common::error::Error;
pub use audio::{FrameBuffer, PlaybackSequencer};
pub use config::BotConfig;
pub use presence::PresenceReactor;
