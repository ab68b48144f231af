//! zhurma-server/src/context.rs
//!
//! Defines the main "global" context (ServerContext) for the bot server.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use zhurma_core::Error;
use zhurma_core::audio::{FrameBuffer, PlaybackSequencer};
use zhurma_core::config::BotConfig;
use zhurma_core::eventbus::{BotEvent, EventBus};
use zhurma_core::platforms::discord::DiscordPlatform;
use zhurma_core::presence::PresenceReactor;
use zhurma_core::services::event_dispatcher::EventDispatcher;
use zhurma_core::services::event_handlers::{HandlerContext, register_builtin_handlers};
use zhurma_core::services::event_registry::EventHandlerRegistry;

/// Everything the running bot holds on to between startup and shutdown.
pub struct ServerContext {
    pub config: Arc<BotConfig>,
    pub event_bus: Arc<EventBus>,
    pub frame_buffer: Arc<FrameBuffer>,
    pub registry: Arc<EventHandlerRegistry>,
    pub platform: DiscordPlatform,
    pub dispatcher_task: JoinHandle<()>,
}

impl ServerContext {
    /// Load the sound, connect to Discord and start dispatching events.
    pub async fn new(config: BotConfig) -> Result<Self, Error> {
        let config = Arc::new(config);

        // 1) Sound asset. A bad asset keeps the bot running; playback then
        //    reports NotLoaded for every request.
        let frame_buffer = Arc::new(FrameBuffer::new());
        match frame_buffer.load_from_path(&config.asset_path) {
            Ok(count) => info!("Loaded {count} frames from {}", config.asset_path.display()),
            Err(e) => error!(
                "Could not load sound asset {}: {e}; airhorn playback is disabled",
                config.asset_path.display()
            ),
        }

        // 2) Event bus. Subscribe before the gateway starts publishing.
        let event_bus = Arc::new(EventBus::new());
        let events: mpsc::Receiver<BotEvent> = event_bus.subscribe(None).await;

        // 3) Discord gateway, cache and voice manager
        let mut platform = DiscordPlatform::new(config.token.clone(), event_bus.clone());
        platform.connect().await?;
        let session = Arc::new(platform.session()?);
        let voice = Arc::new(platform.voice()?);

        // 4) Engines
        let sequencer = Arc::new(
            PlaybackSequencer::new(frame_buffer.clone(), voice).with_settle_delay(config.settle_delay),
        );
        let reactor = Arc::new(PresenceReactor::new(
            session.clone(),
            config.trigger_member_id,
            config.isolation_channel_name.clone(),
        ));

        // 5) Handlers + dispatcher
        let registry = Arc::new(EventHandlerRegistry::new());
        let handler_ctx = HandlerContext {
            session,
            sequencer,
            reactor,
            config: config.clone(),
        };
        register_builtin_handlers(&registry, &handler_ctx).await?;
        for info in registry.list_handlers().await {
            info!("Handler '{}' => {:?}", info.id, info.event_types);
        }

        let dispatcher_task = EventDispatcher::new(registry.clone(), event_bus.clone()).spawn(events);

        Ok(Self {
            config,
            event_bus,
            frame_buffer,
            registry,
            platform,
            dispatcher_task,
        })
    }

    /// Close the gateway and wait for the dispatcher to finish.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        self.event_bus.shutdown();
        self.platform.disconnect().await?;
        info!("Discord connection => {:?}", self.platform.connection_status());
        if let Err(e) = self.dispatcher_task.await {
            warn!("Dispatcher task ended abnormally: {e}");
        }
        Ok(())
    }
}
