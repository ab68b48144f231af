pub mod runtime;
pub mod session;
pub mod voice;

pub use runtime::DiscordPlatform;
pub use session::TwilightSession;
pub use voice::{SongbirdLink, SongbirdVoice};
