//! Core contract shared between the sync runtime and frontend consumers.
//!
//! This crate defines the command/event protocol, the deduplicating message
//! store, the channel lifecycle model, retry and send-queue helpers, and the
//! common error/channel abstractions. It performs no I/O.

/// Async command/event channel primitives.
pub mod channel;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Event normalization helpers (for example send acknowledgements).
pub mod normalization;
/// Bounded outbound send queue used while the channel is not open.
pub mod queue;
/// Backoff policy used by the reconnection supervisor.
pub mod retry;
/// Channel session lifecycle state machine.
pub mod state_machine;
/// Ordered, deduplicated per-conversation message store.
pub mod store;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use channel::{ChatChannelError, ChatChannels, EventStream};
pub use error::{ChatError, ChatErrorCategory, classify_http_status};
pub use normalization::{SendOutcome, normalize_fatal_error, normalize_send_outcome};
pub use queue::{QueuedSend, SendQueue};
pub use retry::RetryPolicy;
pub use state_machine::ChannelStateMachine;
pub use store::MessageStore;
pub use types::{
    ChannelState, ChatCommand, ChatEvent, ChatInitConfig, ConversationSummary, Message,
    MessageDirection, MessageId, SendAck, SyncStatus, WireMessage,
};
