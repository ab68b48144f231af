// File: zhurma-common/src/traits/discord_traits.rs

use async_trait::async_trait;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

use crate::Error;
use crate::models::{ChannelCreateRequest, VoiceOccupancy};

/// The slice of a connected Discord session the bot's reactions need:
/// cache lookups (synchronous, answered from the in-memory cache) and
/// a handful of REST calls.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait DiscordSession: Send + Sync {
    /// The bot's own user id, once the session knows it.
    fn current_user_id(&self) -> Option<Id<UserMarker>>;

    /// Guild owning `channel_id`, or `Error::NotFound`.
    fn channel_guild(&self, channel_id: Id<ChannelMarker>) -> Result<Id<GuildMarker>, Error>;

    /// Snapshot of the guild's voice states, or `Error::NotFound`.
    fn voice_occupancy(&self, guild_id: Id<GuildMarker>) -> Result<VoiceOccupancy, Error>;

    /// Returns the new channel's id, or `Error::CreateFailed`.
    async fn create_voice_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<Id<ChannelMarker>, Error>;

    /// Returns `Error::MoveFailed` when the platform rejects the move.
    async fn move_member(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<(), Error>;

    async fn send_message(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<(), Error>;

    /// Sets the "Playing ..." activity on every shard.
    async fn set_activity(&self, name: &str) -> Result<(), Error>;
}
