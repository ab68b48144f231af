// File: zhurma-common/src/models/discord.rs
//
// Platform-shaped values passed between the gateway glue and the engines.
// Ids are twilight's typed snowflakes so a guild id can never be handed
// where a channel id is expected.

use std::collections::HashMap;

use twilight_model::channel::ChannelType;
use twilight_model::guild::Permissions;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

/// A chat message as seen by the command handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub channel_id: Id<ChannelMarker>,
    pub guild_id: Option<Id<GuildMarker>>,
    pub author_id: Id<UserMarker>,
    pub author_name: String,
    pub content: String,
}

/// A member's voice state after an update, with the channel they occupied
/// just before it (taken from the cache prior to applying the update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateChange {
    pub guild_id: Option<Id<GuildMarker>>,
    pub user_id: Id<UserMarker>,
    pub channel_id: Option<Id<ChannelMarker>>,
    pub previous_channel_id: Option<Id<ChannelMarker>>,
}

impl VoiceStateChange {
    /// The channel the member has just entered, if this update is an entry.
    ///
    /// Leaving (no channel) and in-place updates such as mute toggles are
    /// not entries.
    pub fn entered_channel(&self) -> Option<Id<ChannelMarker>> {
        match self.channel_id {
            Some(current) if self.previous_channel_id != Some(current) => Some(current),
            _ => None,
        }
    }
}

/// Point-in-time view of who sits in which voice channel of one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceOccupancy {
    states: HashMap<Id<UserMarker>, Id<ChannelMarker>>,
}

impl VoiceOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: Id<UserMarker>, channel_id: Id<ChannelMarker>) {
        self.states.insert(user_id, channel_id);
    }

    pub fn channel_of(&self, user_id: Id<UserMarker>) -> Option<Id<ChannelMarker>> {
        self.states.get(&user_id).copied()
    }

    /// Members currently in `channel_id`, ordered by id so repeated calls on
    /// the same snapshot agree.
    pub fn members_in(&self, channel_id: Id<ChannelMarker>) -> Vec<Id<UserMarker>> {
        let mut members: Vec<_> = self
            .states
            .iter()
            .filter(|(_, ch)| **ch == channel_id)
            .map(|(user, _)| *user)
            .collect();
        members.sort();
        members
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl FromIterator<(Id<UserMarker>, Id<ChannelMarker>)> for VoiceOccupancy {
    fn from_iter<T: IntoIterator<Item = (Id<UserMarker>, Id<ChannelMarker>)>>(iter: T) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}

/// A member-scoped permission overwrite for a channel being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberOverwrite {
    pub member_id: Id<UserMarker>,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl MemberOverwrite {
    /// Locks `member_id` out: cannot see, join or talk in the channel.
    pub fn lockout(member_id: Id<UserMarker>) -> Self {
        Self {
            member_id,
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK,
        }
    }
}

/// How the HTTP layer may retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub retry_on_rate_limit: bool,
}

impl RetryPolicy {
    /// Fire once; a rate-limited or failed request is reported, not queued.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        retry_on_rate_limit: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCreateRequest {
    pub guild_id: Id<GuildMarker>,
    pub name: String,
    pub kind: ChannelType,
    pub overwrites: Vec<MemberOverwrite>,
    pub retry: RetryPolicy,
}

impl ChannelCreateRequest {
    /// A voice channel `member_id` is locked out of, created without retries.
    pub fn isolation(guild_id: Id<GuildMarker>, name: &str, member_id: Id<UserMarker>) -> Self {
        Self {
            guild_id,
            name: name.to_string(),
            kind: ChannelType::GuildVoice,
            overwrites: vec![MemberOverwrite::lockout(member_id)],
            retry: RetryPolicy::NONE,
        }
    }

    pub fn denies(&self, member_id: Id<UserMarker>, permissions: Permissions) -> bool {
        self.overwrites
            .iter()
            .any(|o| o.member_id == member_id && o.deny.contains(permissions))
    }
}
