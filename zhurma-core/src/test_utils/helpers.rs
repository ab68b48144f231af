// File: zhurma-core/src/test_utils/helpers.rs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

use crate::Error;
use crate::audio::dca::write_frame;
use zhurma_common::models::{ChannelCreateRequest, Frame, VoiceOccupancy};
use zhurma_common::traits::{DiscordSession, VoiceGateway, VoiceLink};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a raw container: each payload behind its `u16` little-endian length.
/// Payloads too long for the header are rejected, not truncated.
pub fn encode_container<P: AsRef<[u8]>>(payloads: &[P]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for payload in payloads {
        write_frame(&mut out, payload.as_ref())?;
    }
    Ok(out)
}

/// `count` frames whose payloads differ from each other (and in length),
/// so reordering or dropping shows up in comparisons.
pub fn distinct_payloads(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let len = 3 + i % 7;
            (0..len).map(|j| (i * 31 + j) as u8).collect()
        })
        .collect()
}

pub fn frames_of(payloads: &[Vec<u8>]) -> Vec<Frame> {
    payloads.iter().cloned().map(Frame::from).collect()
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCall {
    Join {
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        self_mute: bool,
        self_deaf: bool,
    },
    Speaking {
        channel_id: Id<ChannelMarker>,
        speaking: bool,
    },
    Frame {
        channel_id: Id<ChannelMarker>,
        payload: Bytes,
    },
    Disconnect {
        channel_id: Id<ChannelMarker>,
    },
}

/// Voice gateway that records every call made through it and its links.
#[derive(Clone, Default)]
pub struct RecordingVoiceGateway {
    calls: Arc<Mutex<Vec<VoiceCall>>>,
    refuse_join: bool,
    drop_after: Option<usize>,
}

impl RecordingVoiceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every join fails with `JoinFailed`.
    pub fn refusing_joins() -> Self {
        Self {
            refuse_join: true,
            ..Self::default()
        }
    }

    /// Links accept `frames` frames, then report a dropped connection.
    pub fn dropping_after(frames: usize) -> Self {
        Self {
            drop_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<VoiceCall> {
        locked(&self.calls).clone()
    }

    /// Calls made for one channel, in order.
    pub fn calls_for(&self, channel_id: Id<ChannelMarker>) -> Vec<VoiceCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                VoiceCall::Join { channel_id: c, .. }
                | VoiceCall::Speaking { channel_id: c, .. }
                | VoiceCall::Frame { channel_id: c, .. }
                | VoiceCall::Disconnect { channel_id: c } => *c == channel_id,
            })
            .collect()
    }

    /// Payloads delivered into `channel_id`, in order.
    pub fn frames_sent_to(&self, channel_id: Id<ChannelMarker>) -> Vec<Vec<u8>> {
        self.calls_for(channel_id)
            .into_iter()
            .filter_map(|call| match call {
                VoiceCall::Frame { payload, .. } => Some(payload.to_vec()),
                _ => None,
            })
            .collect()
    }

    pub fn join_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, VoiceCall::Join { .. }))
            .count()
    }
}

#[async_trait]
impl VoiceGateway for RecordingVoiceGateway {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceLink>, Error> {
        if self.refuse_join {
            return Err(Error::JoinFailed(format!("refused join to {channel_id}")));
        }
        locked(&self.calls).push(VoiceCall::Join {
            guild_id,
            channel_id,
            self_mute,
            self_deaf,
        });
        Ok(Box::new(RecordingLink {
            channel_id,
            calls: self.calls.clone(),
            drop_after: self.drop_after,
            sent: 0,
        }))
    }
}

pub struct RecordingLink {
    channel_id: Id<ChannelMarker>,
    calls: Arc<Mutex<Vec<VoiceCall>>>,
    drop_after: Option<usize>,
    sent: usize,
}

#[async_trait]
impl VoiceLink for RecordingLink {
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), Error> {
        locked(&self.calls).push(VoiceCall::Speaking {
            channel_id: self.channel_id,
            speaking,
        });
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        if self.drop_after.is_some_and(|limit| self.sent >= limit) {
            return Err(Error::Platform("voice connection dropped".into()));
        }
        // Yield so concurrent playbacks interleave.
        tokio::task::yield_now().await;
        locked(&self.calls).push(VoiceCall::Frame {
            channel_id: self.channel_id,
            payload: frame.into_bytes(),
        });
        self.sent += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        locked(&self.calls).push(VoiceCall::Disconnect {
            channel_id: self.channel_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// In-memory guild state plus a record of every write made through it.
///
/// Successful moves update the stored occupancy like the real cache would.
pub struct RecordingSession {
    user_id: Option<Id<UserMarker>>,
    text_channels: HashMap<Id<ChannelMarker>, Id<GuildMarker>>,
    occupancy: Mutex<HashMap<Id<GuildMarker>, VoiceOccupancy>>,
    failing_moves: HashSet<Id<UserMarker>>,
    fail_create: bool,
    next_channel: AtomicU64,

    created: Mutex<Vec<ChannelCreateRequest>>,
    moves: Mutex<Vec<(Id<UserMarker>, Id<ChannelMarker>)>>,
    messages: Mutex<Vec<(Id<ChannelMarker>, String)>>,
    activities: Mutex<Vec<String>>,
}

/// First id handed out for channels created through a `RecordingSession`.
pub const FIRST_CREATED_CHANNEL: u64 = 9_000;

impl RecordingSession {
    pub fn new(user_id: Option<Id<UserMarker>>) -> Self {
        Self {
            user_id,
            text_channels: HashMap::new(),
            occupancy: Mutex::new(HashMap::new()),
            failing_moves: HashSet::new(),
            fail_create: false,
            next_channel: AtomicU64::new(FIRST_CREATED_CHANNEL),
            created: Mutex::new(Vec::new()),
            moves: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            activities: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text_channel(mut self, channel_id: Id<ChannelMarker>, guild_id: Id<GuildMarker>) -> Self {
        self.text_channels.insert(channel_id, guild_id);
        self
    }

    pub fn with_voice(
        self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Self {
        locked(&self.occupancy)
            .entry(guild_id)
            .or_default()
            .insert(user_id, channel_id);
        self
    }

    pub fn with_failing_move(mut self, user_id: Id<UserMarker>) -> Self {
        self.failing_moves.insert(user_id);
        self
    }

    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn created(&self) -> Vec<ChannelCreateRequest> {
        locked(&self.created).clone()
    }

    pub fn moves(&self) -> Vec<(Id<UserMarker>, Id<ChannelMarker>)> {
        locked(&self.moves).clone()
    }

    pub fn messages(&self) -> Vec<(Id<ChannelMarker>, String)> {
        locked(&self.messages).clone()
    }

    pub fn activities(&self) -> Vec<String> {
        locked(&self.activities).clone()
    }
}

#[async_trait]
impl DiscordSession for RecordingSession {
    fn current_user_id(&self) -> Option<Id<UserMarker>> {
        self.user_id
    }

    fn channel_guild(&self, channel_id: Id<ChannelMarker>) -> Result<Id<GuildMarker>, Error> {
        self.text_channels
            .get(&channel_id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("channel {channel_id}")))
    }

    fn voice_occupancy(&self, guild_id: Id<GuildMarker>) -> Result<VoiceOccupancy, Error> {
        locked(&self.occupancy)
            .get(&guild_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("guild {guild_id}")))
    }

    async fn create_voice_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<Id<ChannelMarker>, Error> {
        if self.fail_create {
            return Err(Error::CreateFailed(format!("'{}' rejected", request.name)));
        }
        locked(&self.created).push(request.clone());
        Ok(Id::new(self.next_channel.fetch_add(1, Ordering::SeqCst)))
    }

    async fn move_member(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<(), Error> {
        if self.failing_moves.contains(&user_id) {
            return Err(Error::MoveFailed {
                user_id: user_id.get(),
                reason: "missing permissions".into(),
            });
        }
        locked(&self.moves).push((user_id, channel_id));
        locked(&self.occupancy)
            .entry(guild_id)
            .or_default()
            .insert(user_id, channel_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<(), Error> {
        locked(&self.messages).push((channel_id, content.to_string()));
        Ok(())
    }

    async fn set_activity(&self, name: &str) -> Result<(), Error> {
        locked(&self.activities).push(name.to_string());
        Ok(())
    }
}
