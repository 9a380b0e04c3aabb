use serde::{Deserialize, Serialize};

/// Connection state of the live channel session, reported to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelState {
    /// No session is bound to a conversation.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The live channel is established and delivering messages.
    Open,
    /// An explicit close is in progress.
    Closing,
    /// The session is closed; closing again is a no-op.
    Closed,
    /// The transport reported a protocol or network error.
    Errored,
}

/// Whether a message originated from the local user or a counterpart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Submitted by the local user.
    Sent,
    /// Delivered by a counterpart over the channel or history.
    Received,
}

/// Message identity: backend-assigned once persisted, client-assigned while
/// a send is still in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageId {
    /// Durable identifier assigned by the backend.
    Permanent(String),
    /// Client-generated identifier for an unconfirmed local send.
    Temporary(String),
}

impl MessageId {
    /// Whether this identifier is still the client-generated placeholder.
    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageId::Temporary(_))
    }

    /// The raw identifier value regardless of provenance.
    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Permanent(value) | MessageId::Temporary(value) => value,
        }
    }
}

/// Canonical message representation held by the store and shown to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Permanent or temporary identity (see [`MessageId`]).
    pub id: MessageId,
    /// Sender identifier as reported by the backend.
    pub sender_id: String,
    /// Display-ready message body.
    pub content: String,
    /// Ordering key in milliseconds since Unix epoch. Backend-assigned for
    /// persisted messages, local submission time for pending sends.
    pub timestamp_ms: u64,
    /// Sent-by-local-user vs received-from-counterpart tag.
    pub direction: MessageDirection,
}

/// Wire shape shared by history rows, sync rows, and inbound live frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Backend-assigned message identifier.
    pub id: String,
    /// Backend-assigned timestamp in milliseconds since Unix epoch.
    pub timestamp: u64,
    /// Sender identifier.
    pub sender_id: String,
    /// Message body.
    pub content: String,
    /// Optional direction tag; absent on some history rows.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageDirection>,
}

impl WireMessage {
    /// Convert to the canonical message form, deriving the direction from the
    /// sender when the backend did not tag the row.
    pub fn into_message(self, local_sender_id: &str) -> Message {
        let direction = self.kind.unwrap_or(if self.sender_id == local_sender_id {
            MessageDirection::Sent
        } else {
            MessageDirection::Received
        });

        Message {
            id: MessageId::Permanent(self.id),
            sender_id: self.sender_id,
            content: self.content,
            timestamp_ms: self.timestamp,
            direction,
        }
    }
}

/// Conversation metadata row for the switchboard's known-conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Backend-issued conversation identifier.
    #[serde(rename = "id")]
    pub conversation_id: String,
    /// User-editable display name.
    pub display_name: String,
    /// Creation time in milliseconds since Unix epoch, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Last-activity time in milliseconds since Unix epoch, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<u64>,
}

/// Optional runtime tuning values applied when spawning the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChatInitConfig {
    /// Cap on queued sends held while the channel is not open.
    pub send_queue_capacity: Option<usize>,
    /// Cap on in-memory message retention per conversation.
    pub store_max_items: Option<usize>,
    /// Time window used to match a live echo against a pending send.
    pub echo_window_ms: Option<u64>,
    /// Base reconnect delay in milliseconds.
    pub retry_base_delay_ms: Option<u64>,
    /// Reconnect delay cap in milliseconds.
    pub retry_max_delay_ms: Option<u64>,
    /// Bounded reconnect attempt budget.
    pub retry_max_attempts: Option<u32>,
}

/// Command channel input accepted by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChatCommand {
    /// Emit the latest known-conversation list.
    ListConversations,
    /// Switch the active conversation: tear down the old session, clear the
    /// store, seed history, then open the live channel.
    SelectConversation {
        /// Target conversation ID.
        conversation_id: String,
    },
    /// Create a new conversation and select it.
    CreateConversation {
        /// Optional display name; the backend picks one when absent.
        display_name: Option<String>,
        /// Optional structured payload produced by the wizard collaborator.
        seed_payload: Option<serde_json::Value>,
    },
    /// Update a conversation's display name.
    RenameConversation {
        /// Target conversation ID.
        conversation_id: String,
        /// Replacement display name.
        display_name: String,
    },
    /// Delete a conversation and, when active, tear down its session.
    DeleteConversation {
        /// Target conversation ID.
        conversation_id: String,
    },
    /// Send a message on the active conversation.
    SendMessage {
        /// Frontend-provided transaction ID echoed in `SendAck`; also used as
        /// the temporary message identifier while the send is pending.
        client_txn_id: String,
        /// Message body.
        content: String,
    },
    /// Unbind the live session without switching conversations.
    Disconnect,
}

/// Acknowledgement for `SendMessage` commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// Original frontend transaction ID.
    pub client_txn_id: String,
    /// Permanent message ID when the backend confirmed one directly.
    pub message_id: Option<String>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
}

/// Supervisor status updates ("reconnecting" signal for the UI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the supervisor is keeping the session alive.
    pub running: bool,
    /// Optional hint about the next retry delay.
    pub retry_hint_ms: Option<u64>,
}

/// Event channel output emitted by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatEvent {
    /// Channel session lifecycle transition.
    StateChanged {
        /// New connection state.
        state: ChannelState,
    },
    /// Full known-conversation list replacement.
    ConversationListUpdated {
        /// Latest conversation summaries, most recent first.
        conversations: Vec<ConversationSummary>,
    },
    /// Active conversation changed (or cleared on delete/teardown).
    ActiveConversationChanged {
        /// Newly active conversation ID, when any.
        conversation_id: Option<String>,
    },
    /// Snapshot of the active conversation's timeline in display order.
    TimelineUpdated {
        /// Conversation the snapshot belongs to.
        conversation_id: String,
        /// Messages in non-decreasing timestamp order.
        messages: Vec<Message>,
    },
    /// Send acknowledgement.
    SendAck(SendAck),
    /// Supervisor status update.
    SyncStatus(SyncStatus),
    /// A queued send was dropped because the queue overflowed.
    Backpressure {
        /// Transaction ID of the dropped (oldest) queued send.
        dropped_client_txn_id: String,
    },
    /// Fatal runtime error.
    FatalError {
        /// Stable error code.
        code: String,
        /// Human-readable error message.
        message: String,
        /// Indicates whether retrying may recover.
        recoverable: bool,
    },
}
