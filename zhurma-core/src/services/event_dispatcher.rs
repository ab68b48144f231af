//! src/services/event_dispatcher.rs
//!
//! Pulls events off the bus and fans each one out to its registered
//! handlers. Every (event, handler) pair runs on its own task, so a slow
//! playback never holds up a voice-state reaction and two events of the
//! same type may be processed at the same time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::eventbus::{BotEvent, EventBus};
use crate::services::event_registry::EventHandlerRegistry;

pub struct EventDispatcher {
    registry: Arc<EventHandlerRegistry>,
    event_bus: Arc<EventBus>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<EventHandlerRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            event_bus,
        }
    }

    /// Subscribe to the bus, then process events in the background until
    /// shutdown is signaled or every publisher is gone.
    ///
    /// The subscription exists once this returns, so nothing published
    /// afterwards is missed.
    pub async fn start(self) -> JoinHandle<()> {
        let rx = self.event_bus.subscribe(None).await;
        self.spawn(rx)
    }

    /// Process events from a subscription taken earlier, e.g. before the
    /// gateway was connected, so nothing published in between is lost.
    pub fn spawn(self, rx: mpsc::Receiver<BotEvent>) -> JoinHandle<()> {
        info!("EventDispatcher started, listening on EventBus");
        tokio::spawn(async move { self.run(rx).await })
    }

    async fn run(self, mut rx: mpsc::Receiver<BotEvent>) {
        let mut shutdown_rx = self.event_bus.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("EventDispatcher shutting down => break from loop.");
                        break;
                    }
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("EventDispatcher channel closed => break from loop.");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, event: BotEvent) {
        let event_type = event.event_type();
        let handlers = self.registry.get_handlers(event_type).await;
        if handlers.is_empty() {
            trace!("No handlers for {event_type}");
            return;
        }

        let event = Arc::new(event);
        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                match handler.handle(&event).await {
                    Ok(true) => debug!("Handler '{}' handled {}", handler.id(), event_type),
                    Ok(false) => trace!("Handler '{}' skipped {}", handler.id(), event_type),
                    Err(e) if e.is_per_request() => {
                        warn!("Handler '{}' failed on {}: {}", handler.id(), event_type, e)
                    }
                    Err(e) => error!("Handler '{}' failed on {}: {:?}", handler.id(), event_type, e),
                }
            });
        }
    }
}
