use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::Error;
use crate::eventbus::BotEvent;
use crate::presence::{PresenceReactor, Reaction};
use crate::services::event_handler::EventHandler;

/// Feeds voice-state updates into the presence reactor.
pub struct PresenceHandler {
    reactor: Arc<PresenceReactor>,
}

impl PresenceHandler {
    pub fn new(reactor: Arc<PresenceReactor>) -> Self {
        Self { reactor }
    }
}

#[async_trait]
impl EventHandler for PresenceHandler {
    fn id(&self) -> &str {
        "discord.presence_reactor"
    }

    fn event_types(&self) -> Vec<String> {
        vec!["voice_state.update".to_string()]
    }

    async fn handle(&self, event: &BotEvent) -> Result<bool, Error> {
        let BotEvent::VoiceStateChanged(change) = event else {
            return Ok(false);
        };

        match self.reactor.react(change).await? {
            Reaction::Isolated(report) => {
                if report.failed.is_empty() {
                    info!(
                        "Isolated {} member(s) into channel {}",
                        report.moved.len(),
                        report.channel_id
                    );
                } else {
                    warn!(
                        "Isolation channel {}: moved {:?}, failed {:?}",
                        report.channel_id, report.moved, report.failed
                    );
                }
                Ok(true)
            }
            Reaction::NotCrowded { occupants } => {
                debug!("Trigger member joined a channel with {occupants} occupant(s); leaving it");
                Ok(false)
            }
            Reaction::SelfEvent | Reaction::NotTriggered => Ok(false),
        }
    }
}
