//! session.rs
//!
//! `DiscordSession` over twilight: reads come from the in-memory cache the
//! shard runners keep current, writes go through the HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use twilight_cache_inmemory::InMemoryCache;
use twilight_gateway::MessageSender;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::outgoing::UpdatePresence;
use twilight_model::gateway::presence::{ActivityType, MinimalActivity, Status};
use twilight_model::channel::permission_overwrite::{PermissionOverwrite, PermissionOverwriteType};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

use crate::Error;
use zhurma_common::models::{ChannelCreateRequest, RetryPolicy, VoiceOccupancy};
use zhurma_common::traits::DiscordSession;

pub struct TwilightSession {
    http: Arc<HttpClient>,
    /// Same token, no ratelimiter: a 429 comes back as an error instead of
    /// being queued and retried.
    direct_http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    shard_senders: Vec<MessageSender>,
    user_id: Id<UserMarker>,
}

impl TwilightSession {
    pub fn new(
        http: Arc<HttpClient>,
        direct_http: Arc<HttpClient>,
        cache: Arc<InMemoryCache>,
        shard_senders: Vec<MessageSender>,
        user_id: Id<UserMarker>,
    ) -> Self {
        Self {
            http,
            direct_http,
            cache,
            shard_senders,
            user_id,
        }
    }

    fn client_for(&self, retry: RetryPolicy) -> &HttpClient {
        if retry == RetryPolicy::NONE {
            &self.direct_http
        } else {
            &self.http
        }
    }
}

#[async_trait]
impl DiscordSession for TwilightSession {
    fn current_user_id(&self) -> Option<Id<UserMarker>> {
        Some(self.user_id)
    }

    fn channel_guild(&self, channel_id: Id<ChannelMarker>) -> Result<Id<GuildMarker>, Error> {
        self.cache
            .channel(channel_id)
            .and_then(|channel| channel.guild_id)
            .ok_or_else(|| Error::NotFound(format!("guild for channel {channel_id}")))
    }

    fn voice_occupancy(&self, guild_id: Id<GuildMarker>) -> Result<VoiceOccupancy, Error> {
        // Copy the ids out first so no cache guard is held while looking
        // up individual voice states.
        let users: Vec<Id<UserMarker>> = match self.cache.guild_voice_states(guild_id) {
            Some(users) => users.iter().copied().collect(),
            None if self.cache.guild(guild_id).is_some() => Vec::new(),
            None => return Err(Error::NotFound(format!("guild {guild_id}"))),
        };

        let occupancy: VoiceOccupancy = users
            .into_iter()
            .filter_map(|user_id| {
                self.cache
                    .voice_state(user_id, guild_id)
                    .map(|state| (user_id, state.channel_id()))
            })
            .collect();
        trace!("Guild {guild_id} voice occupancy: {} member(s)", occupancy.len());
        Ok(occupancy)
    }

    async fn create_voice_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<Id<ChannelMarker>, Error> {
        let overwrites: Vec<PermissionOverwrite> = request
            .overwrites
            .iter()
            .map(|o| PermissionOverwrite {
                allow: o.allow,
                deny: o.deny,
                id: o.member_id.cast(),
                kind: PermissionOverwriteType::Member,
            })
            .collect();

        let channel = self
            .client_for(request.retry)
            .create_guild_channel(request.guild_id, &request.name)
            .kind(request.kind)
            .permission_overwrites(&overwrites)
            .await
            .map_err(|e| Error::CreateFailed(format!("'{}' in guild {}: {e}", request.name, request.guild_id)))?
            .model()
            .await
            .map_err(|e| Error::CreateFailed(format!("decoding created channel: {e}")))?;

        debug!("Created channel '{}' ({})", request.name, channel.id);
        Ok(channel.id)
    }

    async fn move_member(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<(), Error> {
        self.http
            .update_guild_member(guild_id, user_id)
            .channel_id(Some(channel_id))
            .await
            .map_err(|e| Error::MoveFailed {
                user_id: user_id.get(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn send_message(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<(), Error> {
        self.http
            .create_message(channel_id)
            .content(content)
            .await
            .map_err(|e| Error::Platform(format!("Error sending Discord message: {e:?}")))?;
        Ok(())
    }

    async fn set_activity(&self, name: &str) -> Result<(), Error> {
        let activity = MinimalActivity {
            kind: ActivityType::Playing,
            name: name.to_string(),
            url: None,
        };
        let presence = UpdatePresence::new(vec![activity.into()], false, None, Status::Online)
            .map_err(|e| Error::Platform(format!("presence payload: {e}")))?;

        for sender in &self.shard_senders {
            sender
                .command(&presence)
                .map_err(|e| Error::Platform(format!("sending presence update: {e}")))?;
        }
        Ok(())
    }
}
