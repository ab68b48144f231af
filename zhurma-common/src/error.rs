// ================================================================
// File: zhurma-common/src/error.rs
// ================================================================

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    // Sound asset / frame container:
    #[error("Could not open sound asset '{}': {source}", path.display())]
    AssetOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt frame #{index}: header declares {declared} bytes but the stream ended early")]
    CorruptFrame { index: usize, declared: u16 },

    #[error("Frame buffer has already been loaded")]
    AlreadyLoaded,

    #[error("Frame buffer is not loaded")]
    NotLoaded,

    // Voice playback:
    #[error("Failed to join voice channel: {0}")]
    JoinFailed(String),

    #[error("Voice stream interrupted after {sent}/{total} frames: {reason}")]
    StreamInterrupted {
        sent: usize,
        total: usize,
        reason: String,
    },

    // Guild restructuring:
    #[error("Failed to create channel: {0}")]
    CreateFailed(String),

    #[error("Failed to move member {user_id}: {reason}")]
    MoveFailed { user_id: u64, reason: String },
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl Error {
    /// True for the conditions that are contained within a single event
    /// reaction and never take the process down.
    pub fn is_per_request(&self) -> bool {
        matches!(
            self,
            Error::NotLoaded
                | Error::JoinFailed(_)
                | Error::StreamInterrupted { .. }
                | Error::CreateFailed(_)
                | Error::MoveFailed { .. }
                | Error::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_frame_message_names_the_frame() {
        let err = Error::CorruptFrame { index: 3, declared: 120 };
        assert_eq!(
            err.to_string(),
            "Corrupt frame #3: header declares 120 bytes but the stream ended early"
        );
        assert!(!err.is_per_request());
    }

    #[test]
    fn playback_failures_are_per_request() {
        assert!(Error::NotLoaded.is_per_request());
        assert!(Error::JoinFailed("channel full".into()).is_per_request());
        assert!(Error::MoveFailed { user_id: 1, reason: "missing access".into() }.is_per_request());
        assert!(!Error::Config("bad".into()).is_per_request());
    }
}
