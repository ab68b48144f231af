use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::Error;
use crate::eventbus::BotEvent;
use crate::services::event_handler::EventHandler;
use zhurma_common::traits::DiscordSession;

/// Advertises the command as the bot's "Playing ..." status once the
/// session is ready.
pub struct ActivityHandler {
    session: Arc<dyn DiscordSession>,
    activity: String,
}

impl ActivityHandler {
    pub fn new(session: Arc<dyn DiscordSession>, activity: &str) -> Self {
        Self {
            session,
            activity: activity.to_string(),
        }
    }
}

#[async_trait]
impl EventHandler for ActivityHandler {
    fn id(&self) -> &str {
        "discord.activity"
    }

    fn event_types(&self) -> Vec<String> {
        vec!["ready".to_string()]
    }

    async fn handle(&self, event: &BotEvent) -> Result<bool, Error> {
        let BotEvent::Ready { user_id, user_name } = event else {
            return Ok(false);
        };
        info!(
            "ActivityHandler: {} ({}) ready; setting activity '{}'",
            user_name, user_id, self.activity
        );
        self.session.set_activity(&self.activity).await?;
        Ok(true)
    }

    fn priority(&self) -> i32 {
        10
    }
}
