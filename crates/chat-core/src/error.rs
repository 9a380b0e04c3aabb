use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ChannelState;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatErrorCategory {
    /// Missing or expired authentication token. Fatal to this core; owned by
    /// the auth collaborator, never retried here.
    Auth,
    /// Transient transport failure (connection drop, protocol violation).
    Transport,
    /// History or catch-up fetch unavailable; recoverable with backoff.
    Sync,
    /// Send queue overflow; oldest queued item dropped, never fatal.
    Backpressure,
    /// Unparsable inbound payload; dropped and logged, never propagated.
    Malformed,
    /// Invalid input or unsupported configuration.
    Config,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ChatError {
    /// High-level error category.
    pub category: ChatErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl ChatError {
    /// Construct a new error.
    pub fn new(
        category: ChatErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Standard missing/expired-token error.
    pub fn unauthenticated() -> Self {
        Self::new(
            ChatErrorCategory::Auth,
            "unauthenticated",
            "a non-empty authentication token is required to open a channel",
        )
    }

    /// Standard transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Transport, "transport_error", message)
    }

    /// Standard recoverable catch-up failure.
    pub fn sync_unavailable(message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Sync, "sync_unavailable", message)
    }

    /// Standard unparsable-payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Malformed, "malformed_payload", message)
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ChannelState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ChatErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while the channel is in state {current:?}"),
        )
    }
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ChatErrorCategory {
    match status {
        401 | 403 => ChatErrorCategory::Auth,
        400..=499 => ChatErrorCategory::Config,
        500..=599 => ChatErrorCategory::Sync,
        _ => ChatErrorCategory::Internal,
    }
}
