// File: zhurma-common/src/models/mod.rs
pub mod audio;
pub mod discord;

pub use audio::Frame;
pub use discord::{
    ChannelCreateRequest, ChatMessage, MemberOverwrite, RetryPolicy, VoiceOccupancy,
    VoiceStateChange,
};
