//! voice.rs
//!
//! Voice transport on top of Songbird. Joining goes through the shared
//! `Songbird` manager; every playback gets its own live input fed frame by
//! frame from the sequencer.
//!
//! The frames are already Opus, so the live input is written as a DCA1
//! stream (magic, JSON header, `i16` length-prefixed packets). Songbird
//! recognises it and passes the packets through without re-encoding.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::json;
use songbird::input::{AudioStream, Input, LiveInput};
use songbird::tracks::TrackHandle;
use songbird::{Call, Songbird};
use symphonia_core::io::MediaSource;
use symphonia_core::probe::Hint;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::Error;
use zhurma_common::models::Frame;
use zhurma_common::traits::{VoiceGateway, VoiceLink};

/// Frames queued between the sequencer and the mixer. Keeps the sender
/// roughly in step with real-time playback.
pub const FRAME_QUEUE_DEPTH: usize = 8;

const DCA1_MAGIC: &[u8; 4] = b"DCA1";

/// Number of open links per guild.
///
/// Songbird keeps a single `Call` per guild, so links in the same guild
/// share it. Only the last one to disconnect leaves the channel.
#[derive(Debug, Default)]
struct CallHolders {
    counts: StdMutex<HashMap<Id<GuildMarker>, usize>>,
}

impl CallHolders {
    fn counts(&self) -> MutexGuard<'_, HashMap<Id<GuildMarker>, usize>> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self, guild_id: Id<GuildMarker>) {
        *self.counts().entry(guild_id).or_default() += 1;
    }

    /// Returns `true` when no other link holds the guild's call.
    fn release(&self, guild_id: Id<GuildMarker>) -> bool {
        let mut counts = self.counts();
        match counts.get_mut(&guild_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                counts.remove(&guild_id);
                true
            }
        }
    }
}

/// `VoiceGateway` backed by a shared Songbird manager.
///
/// Two playbacks in the same guild share one call: the later join moves it
/// to its channel, and the call is left when the last of them disconnects.
#[derive(Clone)]
pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
    holders: Arc<CallHolders>,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            holders: Arc::new(CallHolders::default()),
        }
    }

    async fn join_call(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Arc<Mutex<Call>>, Error> {
        let call = self
            .songbird
            .join(guild_id.into_nonzero(), channel_id.into_nonzero())
            .await
            .map_err(|e| Error::JoinFailed(format!("guild {guild_id} channel {channel_id}: {e}")))?;

        {
            let mut handler = call.lock().await;
            handler
                .deafen(self_deaf)
                .await
                .map_err(|e| Error::JoinFailed(format!("deafen in {channel_id}: {e}")))?;
            handler
                .mute(self_mute)
                .await
                .map_err(|e| Error::JoinFailed(format!("mute in {channel_id}: {e}")))?;
        }
        Ok(call)
    }
}

#[async_trait]
impl VoiceGateway for SongbirdVoice {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceLink>, Error> {
        info!("(Songbird) Joining voice channel {channel_id} in guild {guild_id}");

        self.holders.acquire(guild_id);
        let call = match self.join_call(guild_id, channel_id, self_mute, self_deaf).await {
            Ok(call) => call,
            Err(e) => {
                self.holders.release(guild_id);
                return Err(e);
            }
        };

        Ok(Box::new(SongbirdLink {
            songbird: self.songbird.clone(),
            holders: self.holders.clone(),
            holding: true,
            guild_id,
            call,
            frames: None,
            track: None,
        }))
    }
}

/// One joined voice connection.
///
/// `set_speaking(true)` starts a live track; frames pushed with `send`
/// reach the mixer through a bounded queue. `set_speaking(false)` closes
/// the queue so the track ends once it has drained.
pub struct SongbirdLink {
    songbird: Arc<Songbird>,
    holders: Arc<CallHolders>,
    holding: bool,
    guild_id: Id<GuildMarker>,
    call: Arc<Mutex<Call>>,
    frames: Option<mpsc::Sender<Frame>>,
    track: Option<TrackHandle>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), Error> {
        if !speaking {
            // Dropping the sender is the end-of-stream signal for the track.
            if self.frames.take().is_some() {
                trace!("(Songbird) Closing frame queue for guild {}", self.guild_id);
            }
            return Ok(());
        }
        if self.frames.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let source = FrameStreamSource::new(rx);
        let mut hint = Hint::new();
        hint.with_extension("dca");
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(source) as Box<dyn MediaSource>,
                hint: Some(hint),
            }),
            None,
        );

        let track = self.call.lock().await.play_input(input);
        debug!("(Songbird) Started live track in guild {}", self.guild_id);
        self.frames = Some(tx);
        self.track = Some(track);
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        let Some(tx) = self.frames.as_ref() else {
            return Err(Error::Platform("send before speaking was enabled".into()));
        };
        tx.send(frame)
            .await
            .map_err(|_| Error::Platform(format!("voice track in guild {} stopped reading", self.guild_id)))
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.frames = None;
        if let Some(track) = self.track.take() {
            // Already finished tracks report an error here; that's fine.
            let _ = track.stop();
        }
        if !std::mem::take(&mut self.holding) {
            return Ok(());
        }
        if !self.holders.release(self.guild_id) {
            debug!(
                "(Songbird) Call in guild {} still in use; not leaving",
                self.guild_id
            );
            return Ok(());
        }
        self.songbird
            .leave(self.guild_id.into_nonzero())
            .await
            .map_err(|e| Error::Platform(format!("leave guild {}: {e}", self.guild_id)))?;
        info!("(Songbird) Left voice in guild {}", self.guild_id);
        Ok(())
    }
}

impl Drop for SongbirdLink {
    fn drop(&mut self) {
        if self.frames.is_some() {
            warn!("(Songbird) Link for guild {} dropped while speaking", self.guild_id);
        }
        if self.holding {
            self.holders.release(self.guild_id);
        }
    }
}

/// Blocking reader that turns queued frames into a DCA1 byte stream.
///
/// Only ever read from Songbird's blocking threads.
pub struct FrameStreamSource {
    frames: mpsc::Receiver<Frame>,
    pending: Bytes,
    finished: bool,
}

impl FrameStreamSource {
    pub fn new(frames: mpsc::Receiver<Frame>) -> Self {
        Self {
            frames,
            pending: dca1_header(),
            finished: false,
        }
    }
}

impl Read for FrameStreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.frames.blocking_recv() {
                Some(frame) => self.pending = dca1_packet(&frame)?,
                None => self.finished = true,
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Seek for FrameStreamSource {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live frame stream is not seekable",
        ))
    }
}

impl MediaSource for FrameStreamSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

fn dca1_header() -> Bytes {
    let metadata = json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null
            }
        },
        "opus": {
            "mode": "voip",
            "sample_rate": 48000,
            "frame_size": 960,
            "abr": null,
            "vbr": true,
            "channels": 2
        }
    })
    .to_string();

    let mut out = BytesMut::with_capacity(DCA1_MAGIC.len() + 4 + metadata.len());
    out.put_slice(DCA1_MAGIC);
    out.put_i32_le(metadata.len() as i32);
    out.put_slice(metadata.as_bytes());
    out.freeze()
}

fn dca1_packet(frame: &Frame) -> io::Result<Bytes> {
    let len = i16::try_from(frame.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes does not fit a DCA1 packet", frame.len()),
        )
    })?;
    let mut out = BytesMut::with_capacity(2 + frame.len());
    out.put_i16_le(len);
    out.put_slice(frame.payload());
    Ok(out.freeze())
}
