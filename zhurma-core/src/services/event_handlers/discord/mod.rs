pub mod guild;
pub mod message;
pub mod ready;
pub mod voice_state;

use std::sync::Arc;

use crate::Error;
use crate::services::event_handlers::HandlerContext;
use crate::services::event_registry::EventHandlerRegistry;

/// Register all Discord event handlers
pub async fn register_handlers(
    registry: &EventHandlerRegistry,
    ctx: &HandlerContext,
) -> Result<(), Error> {
    // Ready event
    registry
        .register(Arc::new(ready::ActivityHandler::new(
            ctx.session.clone(),
            &ctx.config.command_prefix,
        )))
        .await?;

    // Guild availability
    if ctx.config.guild_greeting {
        registry
            .register(Arc::new(guild::GuildGreetingHandler::new(
                ctx.session.clone(),
                &ctx.config.command_prefix,
            )))
            .await?;
    }

    // Message events (the playback trigger)
    registry
        .register(Arc::new(message::AirhornCommandHandler::new(
            ctx.session.clone(),
            ctx.sequencer.clone(),
            &ctx.config.command_prefix,
        )))
        .await?;

    // Voice state events
    registry
        .register(Arc::new(voice_state::PresenceHandler::new(
            ctx.reactor.clone(),
        )))
        .await?;

    Ok(())
}
