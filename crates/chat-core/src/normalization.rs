use crate::{
    error::ChatError,
    types::{ChatEvent, SendAck},
};

/// Internal helper describing a send outcome before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The send was handed to the channel; a permanent ID is present only
    /// when the backend confirmed one directly.
    Success { message_id: Option<String> },
    /// The send failed with error details.
    Failure { error: ChatError },
}

/// Convert a send outcome to a stable `ChatEvent::SendAck`.
pub fn normalize_send_outcome(
    client_txn_id: impl Into<String>,
    outcome: SendOutcome,
) -> ChatEvent {
    let client_txn_id = client_txn_id.into();
    match outcome {
        SendOutcome::Success { message_id } => ChatEvent::SendAck(SendAck {
            client_txn_id,
            message_id,
            error_code: None,
        }),
        SendOutcome::Failure { error } => ChatEvent::SendAck(SendAck {
            client_txn_id,
            message_id: None,
            error_code: Some(error.code),
        }),
    }
}

/// Convert an error into a `FatalError` event.
pub fn normalize_fatal_error(error: ChatError, recoverable: bool) -> ChatEvent {
    ChatEvent::FatalError {
        code: error.code,
        message: error.message,
        recoverable,
    }
}
