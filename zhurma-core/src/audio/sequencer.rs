//! src/audio/sequencer.rs
//!
//! Streams the whole frame buffer into one voice channel:
//!
//!   join -> settle -> speaking on -> every frame, in order -> speaking off
//!   -> settle -> disconnect
//!
//! Once joined, the speaking-off and disconnect steps always run, even if
//! the stream broke halfway through.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::Error;
use crate::audio::FrameBuffer;
use zhurma_common::models::Frame;
use zhurma_common::traits::{VoiceGateway, VoiceLink};

/// Wait after joining and before leaving so the voice handshake and the
/// tail of the outbound queue have time to complete.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

const SELF_MUTE: bool = false;
const SELF_DEAF: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub frames_sent: usize,
}

pub struct PlaybackSequencer {
    buffer: Arc<FrameBuffer>,
    voice: Arc<dyn VoiceGateway>,
    settle_delay: Duration,
}

impl PlaybackSequencer {
    pub fn new(buffer: Arc<FrameBuffer>, voice: Arc<dyn VoiceGateway>) -> Self {
        Self {
            buffer,
            voice,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Play the full buffer once into `channel_id`.
    pub async fn play(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<PlaybackReport, Error> {
        // Checked before touching the voice gateway at all.
        let frames = self.buffer.frames()?;

        let mut link = self
            .voice
            .join(guild_id, channel_id, SELF_MUTE, SELF_DEAF)
            .await
            .map_err(|e| match e {
                Error::JoinFailed(_) => e,
                other => Error::JoinFailed(other.to_string()),
            })?;
        debug!("Joined voice channel {channel_id} in guild {guild_id}");

        sleep(self.settle_delay).await;

        let streamed = stream_frames(link.as_mut(), &frames).await;

        if let Err(e) = link.set_speaking(false).await {
            warn!("Could not clear speaking state in {channel_id}: {e}");
        }
        sleep(self.settle_delay).await;
        if let Err(e) = link.disconnect().await {
            warn!("Could not disconnect from {channel_id}: {e}");
        }

        let frames_sent = streamed?;
        info!("Played {frames_sent} frames into channel {channel_id} (guild {guild_id})");
        Ok(PlaybackReport { frames_sent })
    }
}

async fn stream_frames(link: &mut dyn VoiceLink, frames: &[Frame]) -> Result<usize, Error> {
    let total = frames.len();

    link.set_speaking(true)
        .await
        .map_err(|e| Error::StreamInterrupted {
            sent: 0,
            total,
            reason: e.to_string(),
        })?;

    for (sent, frame) in frames.iter().enumerate() {
        link.send(frame.clone())
            .await
            .map_err(|e| Error::StreamInterrupted {
                sent,
                total,
                reason: e.to_string(),
            })?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use zhurma_common::traits::{MockVoiceGateway, MockVoiceLink};

    fn guild() -> Id<GuildMarker> {
        Id::new(100)
    }

    fn channel() -> Id<ChannelMarker> {
        Id::new(200)
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::new(vec![i as u8; 4])).collect()
    }

    fn sequencer(buffer: FrameBuffer, gateway: MockVoiceGateway) -> PlaybackSequencer {
        PlaybackSequencer::new(Arc::new(buffer), Arc::new(gateway))
            .with_settle_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn speaking_brackets_every_frame_in_order() -> Result<(), Error> {
        let mut seq = Sequence::new();
        let mut link = MockVoiceLink::new();

        link.expect_set_speaking()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        for frame in frames(3) {
            link.expect_send()
                .with(eq(frame))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }
        link.expect_set_speaking()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        link.expect_disconnect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_join()
            .with(eq(guild()), eq(channel()), eq(false), eq(true))
            .times(1)
            .return_once(move |_, _, _, _| Ok(Box::new(link) as Box<dyn VoiceLink>));

        let report = sequencer(FrameBuffer::with_frames(frames(3)), gateway)
            .play(guild(), channel())
            .await?;
        assert_eq!(report.frames_sent, 3);
        Ok(())
    }

    #[tokio::test]
    async fn unloaded_buffer_never_joins() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(0);

        let result = sequencer(FrameBuffer::new(), gateway)
            .play(guild(), channel())
            .await;
        assert!(matches!(result, Err(Error::NotLoaded)));
    }

    #[tokio::test]
    async fn join_failure_aborts_without_streaming() {
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_join()
            .times(1)
            .returning(|_, _, _, _| Err(Error::Platform("channel full".into())));

        let result = sequencer(FrameBuffer::with_frames(frames(2)), gateway)
            .play(guild(), channel())
            .await;
        match result {
            Err(Error::JoinFailed(reason)) => assert!(reason.contains("channel full")),
            other => panic!("expected JoinFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_connection_still_clears_speaking_and_disconnects() {
        let mut link = MockVoiceLink::new();
        link.expect_set_speaking()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));

        let mut sent = 0;
        link.expect_send().times(2).returning(move |_| {
            sent += 1;
            if sent == 2 {
                Err(Error::Platform("voice websocket closed".into()))
            } else {
                Ok(())
            }
        });
        link.expect_set_speaking()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));
        link.expect_disconnect().times(1).returning(|| Ok(()));

        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_join()
            .return_once(move |_, _, _, _| Ok(Box::new(link) as Box<dyn VoiceLink>));

        let result = sequencer(FrameBuffer::with_frames(frames(5)), gateway)
            .play(guild(), channel())
            .await;
        match result {
            Err(Error::StreamInterrupted { sent, total, .. }) => {
                assert_eq!(sent, 1);
                assert_eq!(total, 5);
            }
            other => panic!("expected StreamInterrupted, got {other:?}"),
        }
    }
}
