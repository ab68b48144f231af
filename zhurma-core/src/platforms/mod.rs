// File: src/platforms/mod.rs

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

pub mod discord;
