use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Error;
use crate::audio::PlaybackSequencer;
use crate::eventbus::BotEvent;
use crate::services::event_handler::EventHandler;
use zhurma_common::models::ChatMessage;
use zhurma_common::traits::DiscordSession;

/// Plays the airhorn into the author's current voice channel when a
/// message starts with the command prefix.
///
/// The author gets no reply either way; failures only show up in the log.
pub struct AirhornCommandHandler {
    session: Arc<dyn DiscordSession>,
    sequencer: Arc<PlaybackSequencer>,
    command_prefix: String,
}

impl AirhornCommandHandler {
    pub fn new(
        session: Arc<dyn DiscordSession>,
        sequencer: Arc<PlaybackSequencer>,
        command_prefix: &str,
    ) -> Self {
        Self {
            session,
            sequencer,
            command_prefix: command_prefix.to_string(),
        }
    }

    async fn handle_message(&self, msg: &ChatMessage) -> Result<bool, Error> {
        if self.session.current_user_id() == Some(msg.author_id) {
            return Ok(false);
        }
        if !msg.content.starts_with(&self.command_prefix) {
            return Ok(false);
        }

        debug!(
            "AirhornCommandHandler: '{}' from {} ({}) in {}",
            self.command_prefix, msg.author_name, msg.author_id, msg.channel_id
        );

        let guild_id = match self.session.channel_guild(msg.channel_id) {
            Ok(id) => id,
            Err(e) => {
                debug!("Could not resolve guild for channel {}: {e}", msg.channel_id);
                return Ok(false);
            }
        };

        let occupancy = match self.session.voice_occupancy(guild_id) {
            Ok(o) => o,
            Err(e) => {
                debug!("No voice states for guild {guild_id}: {e}");
                return Ok(false);
            }
        };

        let Some(voice_channel) = occupancy.channel_of(msg.author_id) else {
            debug!("{} is not in a voice channel; nothing to play", msg.author_id);
            return Ok(false);
        };

        info!(
            "Playing airhorn for {} in voice channel {voice_channel}",
            msg.author_name
        );
        self.sequencer.play(guild_id, voice_channel).await?;
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for AirhornCommandHandler {
    fn id(&self) -> &str {
        "discord.airhorn"
    }

    fn event_types(&self) -> Vec<String> {
        vec!["message.create".to_string()]
    }

    async fn handle(&self, event: &BotEvent) -> Result<bool, Error> {
        match event {
            BotEvent::MessageCreated(msg) => self.handle_message(msg).await,
            _ => Ok(false),
        }
    }

    fn priority(&self) -> i32 {
        50
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameBuffer;
    use mockall::predicate::eq;
    use std::time::Duration;
    use twilight_model::id::Id;
    use zhurma_common::models::{Frame, VoiceOccupancy};
    use zhurma_common::traits::{MockDiscordSession, MockVoiceGateway, MockVoiceLink, VoiceLink};

    const BOT: u64 = 1;
    const AUTHOR: u64 = 10;
    const GUILD: u64 = 500;
    const TEXT_CHANNEL: u64 = 600;
    const VOICE_CHANNEL: u64 = 700;

    fn message(author: u64, content: &str) -> BotEvent {
        BotEvent::MessageCreated(ChatMessage {
            channel_id: Id::new(TEXT_CHANNEL),
            guild_id: Some(Id::new(GUILD)),
            author_id: Id::new(author),
            author_name: "someone".into(),
            content: content.to_string(),
        })
    }

    fn session(occupancy: VoiceOccupancy) -> MockDiscordSession {
        let mut session = MockDiscordSession::new();
        session
            .expect_current_user_id()
            .returning(|| Some(Id::new(BOT)));
        session
            .expect_channel_guild()
            .with(eq(Id::new(TEXT_CHANNEL)))
            .returning(|_| Ok(Id::new(GUILD)));
        session
            .expect_voice_occupancy()
            .returning(move |_| Ok(occupancy.clone()));
        session
    }

    fn handler(session: MockDiscordSession, gateway: MockVoiceGateway) -> AirhornCommandHandler {
        let buffer = Arc::new(FrameBuffer::with_frames(vec![Frame::new(vec![1, 2, 3])]));
        let sequencer = PlaybackSequencer::new(buffer, Arc::new(gateway))
            .with_settle_delay(Duration::from_millis(1));
        AirhornCommandHandler::new(Arc::new(session), Arc::new(sequencer), "!airhorn")
    }

    fn quiet_link() -> MockVoiceLink {
        let mut link = MockVoiceLink::new();
        link.expect_set_speaking().returning(|_| Ok(()));
        link.expect_send().returning(|_| Ok(()));
        link.expect_disconnect().returning(|| Ok(()));
        link
    }

    #[tokio::test]
    async fn plays_into_the_authors_voice_channel() -> Result<(), Error> {
        let occupancy: VoiceOccupancy = [(Id::new(AUTHOR), Id::new(VOICE_CHANNEL))]
            .into_iter()
            .collect();
        let mut gateway = MockVoiceGateway::new();
        let link = quiet_link();
        gateway
            .expect_join()
            .with(eq(Id::new(GUILD)), eq(Id::new(VOICE_CHANNEL)), eq(false), eq(true))
            .times(1)
            .return_once(move |_, _, _, _| Ok(Box::new(link) as Box<dyn VoiceLink>));

        let handled = handler(session(occupancy), gateway)
            .handle(&message(AUTHOR, "!airhorn please"))
            .await?;
        assert!(handled);
        Ok(())
    }

    #[tokio::test]
    async fn author_outside_voice_is_a_no_op() -> Result<(), Error> {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(0);

        let handled = handler(session(VoiceOccupancy::new()), gateway)
            .handle(&message(AUTHOR, "!airhorn"))
            .await?;
        assert!(!handled);
        Ok(())
    }

    #[tokio::test]
    async fn other_messages_are_skipped() -> Result<(), Error> {
        let occupancy: VoiceOccupancy = [(Id::new(AUTHOR), Id::new(VOICE_CHANNEL))]
            .into_iter()
            .collect();
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(0);
        let handler = handler(session(occupancy), gateway);

        assert!(!handler.handle(&message(AUTHOR, "hello !airhorn")).await?);
        assert!(!handler.handle(&message(BOT, "!airhorn")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_channel_is_a_no_op() -> Result<(), Error> {
        let mut session = MockDiscordSession::new();
        session.expect_current_user_id().returning(|| None);
        session
            .expect_channel_guild()
            .returning(|id| Err(Error::NotFound(format!("channel {id}"))));
        session.expect_voice_occupancy().times(0);
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().times(0);

        let handled = handler(session, gateway)
            .handle(&message(AUTHOR, "!airhorn"))
            .await?;
        assert!(!handled);
        Ok(())
    }
}
