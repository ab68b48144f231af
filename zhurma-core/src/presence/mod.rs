//! src/presence/mod.rs
//!
//! Reactions to members entering voice channels.

pub mod reactor;

pub use reactor::{IsolationReport, PresenceReactor, Reaction, CROWD_THRESHOLD};
