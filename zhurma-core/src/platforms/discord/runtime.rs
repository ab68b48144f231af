use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::gateway::payload::incoming::{GuildCreate, Ready as ReadyPayload};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, UserMarker};

use crate::Error;
use crate::eventbus::{BotEvent, EventBus};
use crate::platforms::ConnectionStatus;
use crate::platforms::discord::session::TwilightSession;
use crate::platforms::discord::voice::SongbirdVoice;
use zhurma_common::models::{ChatMessage, VoiceStateChange};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn intents() -> Intents {
    Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT | Intents::GUILD_VOICE_STATES
}

/// How long `disconnect` waits for a shard runner after its close frame.
const SHARD_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// The parts of a gateway shard the runner drives.
#[async_trait]
trait EventSource: Send {
    fn shard_number(&self) -> u32;

    /// Next gateway event; `None` once the shard is closed for good.
    async fn next_gateway_event(&mut self) -> Option<Result<Event, String>>;

    /// Start a normal close. The shard still yields its `GatewayClose`.
    fn begin_close(&mut self);
}

#[async_trait]
impl EventSource for Shard {
    fn shard_number(&self) -> u32 {
        self.id().number()
    }

    async fn next_gateway_event(&mut self) -> Option<Result<Event, String>> {
        self.next_event(EventTypeFlags::all())
            .await
            .map(|item| item.map_err(|e| e.to_string()))
    }

    fn begin_close(&mut self) {
        self.close(CloseFrame::NORMAL);
    }
}

/// Where a runner hands each gateway event.
#[async_trait]
trait EventSink: Send + Sync {
    async fn accept(&self, shard_id: u32, event: Event);
}

/// Cache, voice manager and bus, fed in that order.
struct GatewayPipeline {
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
    event_bus: Arc<EventBus>,
}

#[async_trait]
impl EventSink for GatewayPipeline {
    async fn accept(&self, shard_id: u32, event: Event) {
        // The member's channel has to be read before the cache applies the update.
        let previous_channel = match &event {
            Event::VoiceStateUpdate(update) => update.guild_id.and_then(|guild_id| {
                self.cache
                    .voice_state(update.user_id, guild_id)
                    .map(|state| state.channel_id())
            }),
            _ => None,
        };

        self.cache.update(&event);
        self.songbird.process(&event).await;

        if let Some(bot_event) = translate(shard_id, &event, previous_channel) {
            self.event_bus.publish(bot_event).await;
        }
    }
}

/// Reads one shard until it closes. On shutdown the runner sends a normal
/// close frame and stops at the shard's `GatewayClose`; a close the gateway
/// starts on its own is passed through and the shard reconnects.
async fn shard_runner<S: EventSource>(
    mut shard: S,
    sink: Arc<dyn EventSink>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let shard_id = shard.shard_number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    let mut closing = *shutdown_rx.borrow();
    if closing {
        shard.begin_close();
    }

    loop {
        let item = if closing {
            shard.next_gateway_event().await
        } else {
            tokio::select! {
                item = shard.next_gateway_event() => item,
                changed = shutdown_rx.changed() => {
                    if changed.is_ok() && !*shutdown_rx.borrow() {
                        continue;
                    }
                    debug!("Shard {shard_id} => shutdown requested");
                    shard.begin_close();
                    closing = true;
                    continue;
                }
            }
        };

        let Some(item) = item else { break };
        match item {
            Ok(Event::GatewayClose(frame)) if closing => {
                debug!("Shard {shard_id} => closed: {frame:?}");
                break;
            }
            Ok(event) => sink.accept(shard_id, event).await,
            Err(err) => error!("Shard {shard_id} => error receiving event: {err}"),
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// Maps the gateway events the bot reacts to onto `BotEvent`s.
fn translate(
    shard_id: u32,
    event: &Event,
    previous_channel: Option<Id<ChannelMarker>>,
) -> Option<BotEvent> {
    match event {
        Event::Ready(ready) => {
            let data: &ReadyPayload = ready.as_ref();
            info!(
                "Shard {shard_id} => READY as {} (ID={}) in {} guild(s)",
                data.user.name,
                data.user.id,
                data.guilds.len()
            );
            Some(BotEvent::Ready {
                user_id: data.user.id,
                user_name: data.user.name.clone(),
            })
        }
        Event::GuildCreate(guild_create) => match &**guild_create {
            GuildCreate::Available(guild) => {
                debug!("Shard {shard_id} => guild available: {} ({})", guild.name, guild.id);
                Some(BotEvent::GuildAvailable {
                    guild_id: guild.id,
                    name: guild.name.clone(),
                    channel_ids: guild.channels.iter().map(|c| c.id).collect(),
                })
            }
            GuildCreate::Unavailable(guild) => {
                debug!("Shard {shard_id} => guild {} unavailable", guild.id);
                None
            }
        },
        Event::MessageCreate(msg) => Some(BotEvent::MessageCreated(ChatMessage {
            channel_id: msg.channel_id,
            guild_id: msg.guild_id,
            author_id: msg.author.id,
            author_name: msg.author.name.clone(),
            content: msg.content.clone(),
        })),
        Event::VoiceStateUpdate(update) => Some(BotEvent::VoiceStateChanged(VoiceStateChange {
            guild_id: update.guild_id,
            user_id: update.user_id,
            channel_id: update.channel_id,
            previous_channel_id: previous_channel,
        })),
        _ => {
            trace!("Shard {shard_id} => unhandled event: {:?}", event.kind());
            None
        }
    }
}

/// Owns the gateway shards and the shared clients built on `connect`.
pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<InMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
    pub user_id: Option<Id<UserMarker>>,
    event_bus: Arc<EventBus>,
}

impl DiscordPlatform {
    pub fn new(token: String, event_bus: Arc<EventBus>) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
            user_id: None,
            event_bus,
        }
    }

    fn http_client(&self, with_ratelimiter: bool) -> HttpClient {
        let builder = ClientBuilder::new()
            .token(self.token.clone())
            .timeout(HTTP_TIMEOUT);
        if with_ratelimiter {
            builder.build()
        } else {
            builder.ratelimiter(None).build()
        }
    }

    /// Open the gateway and start one runner task per shard.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }
        if self.token.is_empty() {
            return Err(Error::Config("Discord token is empty".into()));
        }

        let http_client = Arc::new(self.http_client(true));
        self.http = Some(http_client.clone());

        let current_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("fetching current user: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("decoding current user: {e}")))?;
        info!("(DiscordPlatform) Authenticated as {} ({})", current_user.name, current_user.id);
        self.user_id = Some(current_user.id);

        let cache = Arc::new(
            InMemoryCache::builder()
                .resource_types(ResourceType::GUILD | ResourceType::CHANNEL | ResourceType::VOICE_STATE)
                .build(),
        );
        self.cache = Some(cache.clone());

        let config = Config::new(self.token.clone(), intents());
        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        let senders: HashMap<_, _> = shards
            .iter()
            .map(|shard| (shard.id().number().into(), shard.sender()))
            .collect();
        let songbird = Arc::new(Songbird::twilight(
            Arc::new(TwilightMap::new(senders)),
            current_user.id.into_nonzero(),
        ));
        self.songbird = Some(songbird.clone());

        let pipeline: Arc<dyn EventSink> = Arc::new(GatewayPipeline {
            cache,
            songbird,
            event_bus: self.event_bus.clone(),
        });
        for shard in shards {
            self.shard_senders.push(shard.sender());

            let handle = tokio::spawn(shard_runner(
                shard,
                pipeline.clone(),
                self.event_bus.shutdown_rx.clone(),
            ));
            self.shard_tasks.push(handle);
        }

        info!("(DiscordPlatform) {} shard(s) running", self.shard_tasks.len());
        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    /// Close every shard with a normal close frame and wait for the runners.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for mut task in self.shard_tasks.drain(..) {
            match timeout(SHARD_CLOSE_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("(DiscordPlatform) Shard task ended abnormally: {e}"),
                Err(_) => {
                    warn!("(DiscordPlatform) Shard task still running after close; aborting");
                    task.abort();
                }
            }
        }

        self.shard_senders.clear();
        Ok(())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status.clone()
    }

    /// Session adapter over this connection's cache and clients.
    pub fn session(&self) -> Result<TwilightSession, Error> {
        let (Some(http), Some(cache), Some(user_id)) =
            (self.http.clone(), self.cache.clone(), self.user_id)
        else {
            return Err(Error::Platform("Discord platform is not connected".into()));
        };
        Ok(TwilightSession::new(
            http,
            Arc::new(self.http_client(false)),
            cache,
            self.shard_senders.clone(),
            user_id,
        ))
    }

    /// Voice gateway sharing this connection's Songbird manager.
    pub fn voice(&self) -> Result<SongbirdVoice, Error> {
        self.songbird
            .clone()
            .map(SongbirdVoice::new)
            .ok_or_else(|| Error::Platform("Discord platform is not connected".into()))
    }
}
