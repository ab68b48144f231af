pub mod discord;

use std::sync::Arc;

use crate::Error;
use crate::audio::PlaybackSequencer;
use crate::config::BotConfig;
use crate::presence::PresenceReactor;
use crate::services::event_registry::EventHandlerRegistry;
use zhurma_common::traits::DiscordSession;

/// Collaborators shared by the built-in handlers.
#[derive(Clone)]
pub struct HandlerContext {
    pub session: Arc<dyn DiscordSession>,
    pub sequencer: Arc<PlaybackSequencer>,
    pub reactor: Arc<PresenceReactor>,
    pub config: Arc<BotConfig>,
}

/// Register all built-in event handlers with the registry
pub async fn register_builtin_handlers(
    registry: &EventHandlerRegistry,
    ctx: &HandlerContext,
) -> Result<(), Error> {
    discord::register_handlers(registry, ctx).await
}
