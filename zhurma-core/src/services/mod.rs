// File: src/services/mod.rs

pub mod event_dispatcher;
pub mod event_handler;
pub mod event_handlers;
pub mod event_registry;

pub use event_dispatcher::EventDispatcher;
pub use event_handler::EventHandler;
pub use event_registry::EventHandlerRegistry;
