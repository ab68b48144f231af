use async_trait::async_trait;

use crate::Error;
use crate::eventbus::BotEvent;

/// Base trait for all event handlers in the system.
/// Handlers own whatever collaborators they need; the dispatcher only hands
/// them the event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns a unique identifier for this handler
    fn id(&self) -> &str;

    /// Returns the event type(s) this handler can process
    fn event_types(&self) -> Vec<String>;

    /// Process the event. Return Ok(true) if handled, Ok(false) if skipped.
    async fn handle(&self, event: &BotEvent) -> Result<bool, Error>;

    /// Priority for this handler (lower numbers are dispatched first)
    fn priority(&self) -> i32 {
        100
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Metadata about an event handler for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandlerInfo {
    pub id: String,
    pub event_types: Vec<String>,
    pub priority: i32,
    pub enabled: bool,
}
