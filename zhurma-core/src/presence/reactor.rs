//! src/presence/reactor.rs
//!
//! Watches voice-state updates for one configured member. When that member
//! walks into a channel holding more than two people, a fresh voice channel
//! they are locked out of is created and everybody else is moved into it.
//!
//! Each update is evaluated on its own; nothing is carried between updates,
//! so overlapping reactions never see each other's state.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

use crate::Error;
use zhurma_common::models::{ChannelCreateRequest, VoiceStateChange};
use zhurma_common::traits::DiscordSession;

/// A channel with this many occupants or fewer (trigger member included)
/// is left alone.
pub const CROWD_THRESHOLD: usize = 2;

/// Where one reaction stands. Every update walks its own copy from
/// `Evaluating` back to `Idle`; the next step is picked by the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReactorState {
    Evaluating,
    Isolating {
        guild_id: Id<GuildMarker>,
        relocation: Vec<Id<UserMarker>>,
    },
    Idle(Reaction),
}

/// What a single voice-state update led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// The update was about the bot itself.
    SelfEvent,
    /// Someone other than the trigger member, or not a channel entry.
    NotTriggered,
    /// Trigger member entered, but the channel is not crowded.
    NotCrowded { occupants: usize },
    /// Isolation channel created; per-member move results inside.
    Isolated(IsolationReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationReport {
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub moved: Vec<Id<UserMarker>>,
    pub failed: Vec<Id<UserMarker>>,
}

pub struct PresenceReactor {
    session: Arc<dyn DiscordSession>,
    trigger_member: Id<UserMarker>,
    channel_name: String,
}

impl PresenceReactor {
    pub fn new(
        session: Arc<dyn DiscordSession>,
        trigger_member: Id<UserMarker>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            session,
            trigger_member,
            channel_name: channel_name.into(),
        }
    }

    pub fn trigger_member(&self) -> Id<UserMarker> {
        self.trigger_member
    }

    /// Evaluate one voice-state update.
    ///
    /// Errors are `NotFound` (guild not in the cache) and `CreateFailed`;
    /// in both cases no member has been moved. Failed moves are reported in
    /// the returned `IsolationReport`, never as an error.
    pub async fn react(&self, change: &VoiceStateChange) -> Result<Reaction, Error> {
        if self.session.current_user_id() == Some(change.user_id) {
            trace!("Ignoring voice update for the bot itself");
            return Ok(Reaction::SelfEvent);
        }

        let mut state = ReactorState::Evaluating;
        loop {
            trace!("PresenceReactor => {state:?}");
            state = match state {
                ReactorState::Evaluating => self.evaluate(change)?,
                ReactorState::Isolating {
                    guild_id,
                    relocation,
                } => ReactorState::Idle(self.isolate(guild_id, relocation).await?),
                ReactorState::Idle(reaction) => return Ok(reaction),
            };
        }
    }

    /// Decide whether `change` calls for isolation, and whom to move.
    fn evaluate(&self, change: &VoiceStateChange) -> Result<ReactorState, Error> {
        if change.user_id != self.trigger_member {
            return Ok(ReactorState::Idle(Reaction::NotTriggered));
        }
        let (Some(guild_id), Some(channel_id)) = (change.guild_id, change.entered_channel()) else {
            return Ok(ReactorState::Idle(Reaction::NotTriggered));
        };

        let occupancy = self.session.voice_occupancy(guild_id)?;
        let occupants = occupancy.members_in(channel_id);
        debug!(
            "Trigger member {} entered {channel_id}; occupants={:?}",
            self.trigger_member, occupants
        );

        if occupants.len() <= CROWD_THRESHOLD {
            return Ok(ReactorState::Idle(Reaction::NotCrowded {
                occupants: occupants.len(),
            }));
        }

        let relocation = occupants
            .into_iter()
            .filter(|member| *member != self.trigger_member)
            .collect();
        Ok(ReactorState::Isolating {
            guild_id,
            relocation,
        })
    }

    /// Create the locked-out channel, then move each member independently.
    async fn isolate(
        &self,
        guild_id: Id<GuildMarker>,
        relocation: Vec<Id<UserMarker>>,
    ) -> Result<Reaction, Error> {
        let request =
            ChannelCreateRequest::isolation(guild_id, &self.channel_name, self.trigger_member);
        let isolation_channel = self
            .session
            .create_voice_channel(&request)
            .await
            .map_err(|e| match e {
                Error::CreateFailed(_) => e,
                other => Error::CreateFailed(other.to_string()),
            })?;
        info!(
            "Created isolation channel {isolation_channel} in guild {guild_id}; moving {} member(s)",
            relocation.len()
        );

        let mut report = IsolationReport {
            guild_id,
            channel_id: isolation_channel,
            moved: Vec::with_capacity(relocation.len()),
            failed: Vec::new(),
        };

        for member in relocation {
            match self
                .session
                .move_member(guild_id, member, isolation_channel)
                .await
            {
                Ok(()) => report.moved.push(member),
                Err(e) => {
                    warn!("Failed to move member {member} to {isolation_channel}: {e}");
                    report.failed.push(member);
                }
            }
        }

        Ok(Reaction::Isolated(report))
    }
}
