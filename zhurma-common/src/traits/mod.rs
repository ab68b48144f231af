// File: zhurma-common/src/traits/mod.rs
pub mod discord_traits;
pub mod voice_traits;

pub use discord_traits::DiscordSession;
pub use voice_traits::{VoiceGateway, VoiceLink};

#[cfg(any(test, feature = "mocks"))]
pub use discord_traits::MockDiscordSession;
#[cfg(any(test, feature = "mocks"))]
pub use voice_traits::{MockVoiceGateway, MockVoiceLink};
