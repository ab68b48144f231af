use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use twilight_model::id::marker::ChannelMarker;

use crate::Error;
use crate::eventbus::BotEvent;
use crate::services::event_handler::EventHandler;
use zhurma_common::traits::DiscordSession;

/// Posts a short usage hint when a guild becomes available.
///
/// Only guilds whose default text channel still shares the guild's id get
/// the message; other guilds are skipped.
pub struct GuildGreetingHandler {
    session: Arc<dyn DiscordSession>,
    greeting: String,
}

impl GuildGreetingHandler {
    pub fn new(session: Arc<dyn DiscordSession>, command_prefix: &str) -> Self {
        Self {
            session,
            greeting: greeting_for(command_prefix),
        }
    }
}

pub fn greeting_for(command_prefix: &str) -> String {
    format!(
        "Airhorn is ready! Type {command_prefix} while in a voice channel to play a sound."
    )
}

#[async_trait]
impl EventHandler for GuildGreetingHandler {
    fn id(&self) -> &str {
        "discord.guild_greeting"
    }

    fn event_types(&self) -> Vec<String> {
        vec!["guild.available".to_string()]
    }

    async fn handle(&self, event: &BotEvent) -> Result<bool, Error> {
        let BotEvent::GuildAvailable {
            guild_id,
            name,
            channel_ids,
        } = event
        else {
            return Ok(false);
        };

        let default_channel = guild_id.cast::<ChannelMarker>();
        if !channel_ids.contains(&default_channel) {
            debug!("Guild '{name}' ({guild_id}) has no default channel; not greeting");
            return Ok(false);
        }

        info!("Greeting guild '{name}' ({guild_id})");
        self.session
            .send_message(default_channel, &self.greeting)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twilight_model::id::Id;
    use zhurma_common::traits::MockDiscordSession;

    fn available(guild: u64, channels: &[u64]) -> BotEvent {
        BotEvent::GuildAvailable {
            guild_id: Id::new(guild),
            name: "test guild".into(),
            channel_ids: channels.iter().map(|c| Id::new(*c)).collect(),
        }
    }

    #[tokio::test]
    async fn greets_the_default_channel() -> Result<(), Error> {
        let mut session = MockDiscordSession::new();
        session
            .expect_send_message()
            .withf(|channel, content| {
                *channel == Id::new(42) && content == greeting_for("!airhorn")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = GuildGreetingHandler::new(Arc::new(session), "!airhorn");
        assert!(handler.handle(&available(42, &[7, 42, 99])).await?);
        Ok(())
    }

    #[tokio::test]
    async fn skips_guild_without_default_channel() -> Result<(), Error> {
        let mut session = MockDiscordSession::new();
        session.expect_send_message().times(0);

        let handler = GuildGreetingHandler::new(Arc::new(session), "!airhorn");
        assert!(!handler.handle(&available(42, &[7, 99])).await?);
        Ok(())
    }

    #[test]
    fn greeting_mentions_the_prefix() {
        assert_eq!(
            greeting_for("!airhorn"),
            "Airhorn is ready! Type !airhorn while in a voice channel to play a sound."
        );
    }
}
