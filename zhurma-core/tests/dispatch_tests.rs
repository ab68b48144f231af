// tests/dispatch_tests.rs
//
// Events go in through the bus and come out as session and voice calls,
// with the built-in handlers wired the way the server wires them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use twilight_model::guild::Permissions;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

use zhurma_common::models::{ChatMessage, VoiceStateChange};
use zhurma_core::config::BotConfig;
use zhurma_core::eventbus::{BotEvent, EventBus};
use zhurma_core::services::event_dispatcher::EventDispatcher;
use zhurma_core::services::event_handlers::{HandlerContext, register_builtin_handlers};
use zhurma_core::services::event_registry::EventHandlerRegistry;
use zhurma_core::test_utils::{
    FIRST_CREATED_CHANNEL, RecordingSession, RecordingVoiceGateway, distinct_payloads, frames_of,
};
use zhurma_core::{Error, FrameBuffer, PlaybackSequencer, PresenceReactor};

const BOT: u64 = 1;
const TRIGGER: u64 = 66;
const GUILD: u64 = 100;
const TEXT: u64 = 200;
const LOUNGE: u64 = 300;

fn user(n: u64) -> Id<UserMarker> {
    Id::new(n)
}

fn guild() -> Id<GuildMarker> {
    Id::new(GUILD)
}

fn channel(n: u64) -> Id<ChannelMarker> {
    Id::new(n)
}

struct Harness {
    bus: Arc<EventBus>,
    session: Arc<RecordingSession>,
    voice: RecordingVoiceGateway,
}

async fn start(session: RecordingSession, voice: RecordingVoiceGateway) -> Result<Harness, Error> {
    let config = Arc::new(BotConfig {
        trigger_member_id: user(TRIGGER),
        settle_delay: Duration::from_millis(1),
        ..BotConfig::default()
    });
    let session = Arc::new(session);
    let buffer = Arc::new(FrameBuffer::with_frames(frames_of(&distinct_payloads(6))));
    let sequencer = Arc::new(
        PlaybackSequencer::new(buffer, Arc::new(voice.clone())).with_settle_delay(config.settle_delay),
    );
    let reactor = Arc::new(PresenceReactor::new(
        session.clone(),
        config.trigger_member_id,
        config.isolation_channel_name.clone(),
    ));

    let registry = Arc::new(EventHandlerRegistry::new());
    let ctx = HandlerContext {
        session: session.clone(),
        sequencer,
        reactor,
        config,
    };
    register_builtin_handlers(&registry, &ctx).await?;

    let bus = Arc::new(EventBus::new());
    EventDispatcher::new(registry, bus.clone()).start().await;

    Ok(Harness { bus, session, voice })
}

/// Poll until `check` holds; handlers run on their own tasks.
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

fn crowded_lounge() -> RecordingSession {
    RecordingSession::new(Some(user(BOT)))
        .with_text_channel(channel(TEXT), guild())
        .with_voice(guild(), user(TRIGGER), channel(LOUNGE))
        .with_voice(guild(), user(11), channel(LOUNGE))
        .with_voice(guild(), user(12), channel(LOUNGE))
        .with_voice(guild(), user(13), channel(LOUNGE))
}

fn trigger_enters(channel_id: u64) -> BotEvent {
    BotEvent::VoiceStateChanged(VoiceStateChange {
        guild_id: Some(guild()),
        user_id: user(TRIGGER),
        channel_id: Some(channel(channel_id)),
        previous_channel_id: None,
    })
}

#[tokio::test]
async fn test_trigger_member_is_left_alone_in_a_crowd() -> Result<(), Error> {
    let h = start(crowded_lounge(), RecordingVoiceGateway::new()).await?;

    h.bus.publish(trigger_enters(LOUNGE)).await;

    let session = h.session.clone();
    assert!(eventually(|| session.moves().len() == 3).await);

    let created = h.session.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "Anti-Zhurma");
    assert!(created[0].denies(
        user(TRIGGER),
        Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK
    ));

    let isolation = channel(FIRST_CREATED_CHANNEL);
    let mut moved: Vec<_> = h.session.moves();
    moved.sort();
    assert_eq!(
        moved,
        vec![(user(11), isolation), (user(12), isolation), (user(13), isolation)]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_move_does_not_stop_the_rest() -> Result<(), Error> {
    let h = start(
        crowded_lounge().with_failing_move(user(12)),
        RecordingVoiceGateway::new(),
    )
    .await?;

    h.bus.publish(trigger_enters(LOUNGE)).await;

    let session = h.session.clone();
    assert!(eventually(|| session.moves().len() == 2).await);
    sleep(Duration::from_millis(20)).await;

    let moved: Vec<_> = h.session.moves().into_iter().map(|(u, _)| u).collect();
    assert!(moved.contains(&user(11)));
    assert!(moved.contains(&user(13)));
    assert!(!moved.contains(&user(12)));
    Ok(())
}

#[tokio::test]
async fn test_quiet_channel_and_other_members_do_nothing() -> Result<(), Error> {
    let session = RecordingSession::new(Some(user(BOT)))
        .with_voice(guild(), user(TRIGGER), channel(LOUNGE))
        .with_voice(guild(), user(11), channel(LOUNGE))
        .with_voice(guild(), user(12), channel(400))
        .with_voice(guild(), user(13), channel(400))
        .with_voice(guild(), user(14), channel(400));
    let h = start(session, RecordingVoiceGateway::new()).await?;

    h.bus.publish(trigger_enters(LOUNGE)).await;
    h.bus
        .publish(BotEvent::VoiceStateChanged(VoiceStateChange {
            guild_id: Some(guild()),
            user_id: user(14),
            channel_id: Some(channel(400)),
            previous_channel_id: None,
        }))
        .await;
    sleep(Duration::from_millis(50)).await;

    assert!(h.session.created().is_empty());
    assert!(h.session.moves().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bot_voice_updates_are_ignored() -> Result<(), Error> {
    let h = start(crowded_lounge(), RecordingVoiceGateway::new()).await?;

    h.bus
        .publish(BotEvent::VoiceStateChanged(VoiceStateChange {
            guild_id: Some(guild()),
            user_id: user(BOT),
            channel_id: Some(channel(LOUNGE)),
            previous_channel_id: None,
        }))
        .await;
    sleep(Duration::from_millis(50)).await;

    assert!(h.session.created().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_command_plays_into_senders_channel() -> Result<(), Error> {
    let h = start(crowded_lounge(), RecordingVoiceGateway::new()).await?;

    h.bus
        .publish(BotEvent::MessageCreated(ChatMessage {
            channel_id: channel(TEXT),
            guild_id: Some(guild()),
            author_id: user(11),
            author_name: "listener".into(),
            content: "!airhorn".into(),
        }))
        .await;

    let voice = h.voice.clone();
    assert!(eventually(|| voice.frames_sent_to(channel(LOUNGE)).len() == 6).await);
    assert_eq!(h.voice.frames_sent_to(channel(LOUNGE)), distinct_payloads(6));
    Ok(())
}

#[tokio::test]
async fn test_ready_and_guild_greeting() -> Result<(), Error> {
    let h = start(RecordingSession::new(Some(user(BOT))), RecordingVoiceGateway::new()).await?;

    h.bus
        .publish(BotEvent::Ready {
            user_id: user(BOT),
            user_name: "zhurma".into(),
        })
        .await;
    h.bus
        .publish(BotEvent::GuildAvailable {
            guild_id: guild(),
            name: "home".into(),
            channel_ids: vec![channel(GUILD), channel(TEXT)],
        })
        .await;

    let session = h.session.clone();
    assert!(eventually(|| !session.activities().is_empty() && !session.messages().is_empty()).await);
    assert_eq!(h.session.activities(), vec!["!airhorn".to_string()]);
    assert_eq!(
        h.session.messages(),
        vec![(
            channel(GUILD),
            "Airhorn is ready! Type !airhorn while in a voice channel to play a sound.".to_string()
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_dispatcher_stops_on_shutdown() -> Result<(), Error> {
    let bus = Arc::new(EventBus::new());
    let handle = EventDispatcher::new(Arc::new(EventHandlerRegistry::new()), bus.clone())
        .start()
        .await;

    bus.shutdown();
    let joined = timeout(Duration::from_secs(1), handle).await;
    assert!(matches!(joined, Ok(Ok(()))));
    Ok(())
}
