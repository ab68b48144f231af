//! src/config.rs
//!
//! Runtime settings, read from the process environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use twilight_model::id::Id;
use twilight_model::id::marker::UserMarker;

use crate::Error;
use crate::audio::sequencer::DEFAULT_SETTLE_DELAY;

pub const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
pub const TRIGGER_MEMBER_VAR: &str = "ZHURMA_TRIGGER_MEMBER_ID";
pub const ASSET_PATH_VAR: &str = "ZHURMA_ASSET_PATH";
pub const COMMAND_PREFIX_VAR: &str = "ZHURMA_COMMAND_PREFIX";
pub const CHANNEL_NAME_VAR: &str = "ZHURMA_ISOLATION_CHANNEL_NAME";
pub const SETTLE_DELAY_VAR: &str = "ZHURMA_SETTLE_DELAY_MS";
pub const GUILD_GREETING_VAR: &str = "ZHURMA_GUILD_GREETING";

pub const DEFAULT_TRIGGER_MEMBER: u64 = 277_619_169_195_982_850;
pub const DEFAULT_ASSET_PATH: &str = "./airhorn.dca";
pub const DEFAULT_COMMAND_PREFIX: &str = "!airhorn";
pub const DEFAULT_CHANNEL_NAME: &str = "Anti-Zhurma";

#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub trigger_member_id: Id<UserMarker>,
    pub asset_path: PathBuf,
    pub command_prefix: String,
    pub isolation_channel_name: String,
    pub settle_delay: Duration,
    pub guild_greeting: bool,
}

// Keeps the token out of logs.
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("trigger_member_id", &self.trigger_member_id)
            .field("asset_path", &self.asset_path)
            .field("command_prefix", &self.command_prefix)
            .field("isolation_channel_name", &self.isolation_channel_name)
            .field("settle_delay", &self.settle_delay)
            .field("guild_greeting", &self.guild_greeting)
            .finish()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            trigger_member_id: Id::new(DEFAULT_TRIGGER_MEMBER),
            asset_path: PathBuf::from(DEFAULT_ASSET_PATH),
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            isolation_channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            guild_greeting: true,
        }
    }
}

impl BotConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, Error> {
        match dotenv::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) => debug!("No .env file loaded: {e}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset or blank keys
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(token) = get(TOKEN_VAR) {
            config.token = token;
        }
        if let Some(raw) = get(TRIGGER_MEMBER_VAR) {
            config.trigger_member_id = parse_member_id(&raw)?;
        }
        if let Some(path) = get(ASSET_PATH_VAR) {
            config.asset_path = PathBuf::from(path);
        }
        if let Some(prefix) = get(COMMAND_PREFIX_VAR) {
            config.command_prefix = prefix;
        }
        if let Some(name) = get(CHANNEL_NAME_VAR) {
            config.isolation_channel_name = name;
        }
        if let Some(raw) = get(SETTLE_DELAY_VAR) {
            let ms = raw.parse::<u64>().map_err(|e| {
                Error::Config(format!("{SETTLE_DELAY_VAR}='{raw}' is not a millisecond count: {e}"))
            })?;
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = get(GUILD_GREETING_VAR) {
            config.guild_greeting = parse_flag(&raw)
                .ok_or_else(|| Error::Config(format!("{GUILD_GREETING_VAR}='{raw}' is not a boolean")))?;
        }

        Ok(config)
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Parse a member snowflake; zero is rejected.
pub fn parse_member_id(raw: &str) -> Result<Id<UserMarker>, Error> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::Config(format!("'{raw}' is not a valid member id")))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
