use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Error;
use crate::services::event_handler::{EventHandler, EventHandlerInfo};

/// Registry for event handler registration and lookup.
/// Handlers are indexed by event type, each list sorted by priority.
#[derive(Default)]
pub struct EventHandlerRegistry {
    /// event_type -> handlers sorted by priority
    handlers: Arc<RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>>,
    /// handler id -> handler
    handlers_by_id: Arc<RwLock<HashMap<String, Arc<dyn EventHandler>>>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler
    pub async fn register(&self, handler: Arc<dyn EventHandler>) -> Result<(), Error> {
        let handler_id = handler.id().to_string();
        let event_types = handler.event_types();
        let priority = handler.priority();

        info!(
            "Registering event handler '{}' for events {:?} with priority {}",
            handler_id, event_types, priority
        );

        {
            let mut id_map = self.handlers_by_id.write().await;
            if id_map.contains_key(&handler_id) {
                return Err(Error::EventBus(format!(
                    "Handler with ID '{}' already registered",
                    handler_id
                )));
            }
            id_map.insert(handler_id.clone(), handler.clone());
        }

        let mut handlers_map = self.handlers.write().await;
        for event_type in &event_types {
            let handler_list = handlers_map.entry(event_type.clone()).or_default();

            // Insert after any handler with the same priority to keep
            // registration order stable.
            let insert_pos = handler_list.partition_point(|h| h.priority() <= priority);
            handler_list.insert(insert_pos, handler.clone());

            debug!(
                "Handler '{}' registered for {} at position {}",
                handler_id, event_type, insert_pos
            );
        }

        Ok(())
    }

    /// Enabled handlers for `event_type`, in priority order
    pub async fn get_handlers(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read().await;
        handlers
            .get(event_type)
            .map(|list| list.iter().filter(|h| h.is_enabled()).cloned().collect())
            .unwrap_or_default()
    }

    /// List all registered handlers
    pub async fn list_handlers(&self) -> Vec<EventHandlerInfo> {
        let handlers = self.handlers_by_id.read().await;
        let mut infos: Vec<EventHandlerInfo> = handlers
            .values()
            .map(|h| EventHandlerInfo {
                id: h.id().to_string(),
                event_types: h.event_types(),
                priority: h.priority(),
                enabled: h.is_enabled(),
            })
            .collect();
        infos.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::BotEvent;
    use async_trait::async_trait;

    struct TestHandler {
        id: String,
        event_types: Vec<String>,
        priority: i32,
    }

    #[async_trait]
    impl EventHandler for TestHandler {
        fn id(&self) -> &str {
            &self.id
        }

        fn event_types(&self) -> Vec<String> {
            self.event_types.clone()
        }

        async fn handle(&self, _event: &BotEvent) -> Result<bool, Error> {
            Ok(true)
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn handler(id: &str, event_type: &str, priority: i32) -> Arc<TestHandler> {
        Arc::new(TestHandler {
            id: id.to_string(),
            event_types: vec![event_type.to_string()],
            priority,
        })
    }

    #[tokio::test]
    async fn test_handler_registration() {
        let registry = EventHandlerRegistry::new();
        let h = handler("test_handler", "message.create", 100);

        assert!(registry.register(h.clone()).await.is_ok());
        assert!(registry.register(h).await.is_err());

        let handlers = registry.get_handlers("message.create").await;
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].id(), "test_handler");
        assert!(registry.get_handlers("voice_state.update").await.is_empty());
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let registry = EventHandlerRegistry::new();
        for (i, priority) in [(1, 200), (2, 100), (3, 150)] {
            registry
                .register(handler(&format!("handler_{i}"), "ready", priority))
                .await
                .unwrap();
        }

        let ids: Vec<String> = registry
            .get_handlers("ready")
            .await
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, vec!["handler_2", "handler_3", "handler_1"]);
    }
}
