// File: zhurma-common/src/traits/voice_traits.rs

use async_trait::async_trait;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::Error;
use crate::models::Frame;

/// Something that can put the bot into a voice channel.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel_id` and hand back a link that accepts frames.
    ///
    /// Fails with `Error::JoinFailed` when the platform refuses or the
    /// handshake does not complete.
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceLink>, Error>;
}

/// A live, joined voice connection.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait VoiceLink: Send {
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), Error>;

    /// Queue one frame for transmission. Suspends while the outbound queue
    /// is full; an error means the connection is gone.
    async fn send(&mut self, frame: Frame) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;
}
