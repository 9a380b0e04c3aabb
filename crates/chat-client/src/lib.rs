//! Sync runtime for the chat core.
//!
//! Owns all I/O: the catch-up/CRUD client over HTTP, the live websocket
//! channel session, and the conversation switchboard with its reconnection
//! supervisor. Frontends talk to it through the command/event channel pair
//! defined in `chat-core`.

/// Catch-up and conversation CRUD client over HTTP.
pub mod rest;
/// Switchboard command loop and reconnection supervisor.
pub mod runtime;
/// Live channel transport over websocket.
pub mod socket;

pub use rest::{ConversationApi, RestConversationApi};
pub use runtime::{ChatRuntimeHandle, RuntimeConfig, spawn_runtime};
pub use socket::{
    ChannelConnection, ChannelTransport, TransportEvent, WsChannelTransport, parse_frame,
};
