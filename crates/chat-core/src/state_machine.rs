use crate::{
    error::ChatError,
    types::{ChannelState, ChatEvent},
};

/// Lifecycle state machine for one channel session.
///
/// `Idle → Connecting → Open → Closing → Closed`, with `Errored` reachable
/// from `Connecting` and `Open`. Closure is idempotent; `Idle` is reached
/// only through a full teardown before rebinding to another conversation.
#[derive(Debug, Clone)]
pub struct ChannelStateMachine {
    state: ChannelState,
}

impl Default for ChannelStateMachine {
    fn default() -> Self {
        Self {
            state: ChannelState::Idle,
        }
    }
}

impl ChannelStateMachine {
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Start a connection attempt. Requires a non-empty authentication token,
    /// else fails with `unauthenticated` and the state is left untouched.
    /// Allowed from `Idle` (fresh bind) and `Errored` (supervisor retry).
    pub fn begin_connect(&mut self, token: &str) -> Result<ChatEvent, ChatError> {
        if token.trim().is_empty() {
            return Err(ChatError::unauthenticated());
        }

        match self.state {
            ChannelState::Idle | ChannelState::Errored => {
                self.transition(ChannelState::Connecting)
            }
            _ => Err(ChatError::invalid_state(self.state, "begin_connect")),
        }
    }

    /// The transport signalled successful establishment.
    pub fn on_open(&mut self) -> Result<ChatEvent, ChatError> {
        match self.state {
            ChannelState::Connecting => self.transition(ChannelState::Open),
            _ => Err(ChatError::invalid_state(self.state, "on_open")),
        }
    }

    /// The transport reported a protocol or network error. The session
    /// surfaces the condition to the supervisor; it does not retry itself.
    pub fn on_transport_error(&mut self) -> Result<ChatEvent, ChatError> {
        match self.state {
            ChannelState::Connecting | ChannelState::Open => {
                self.transition(ChannelState::Errored)
            }
            _ => Err(ChatError::invalid_state(self.state, "on_transport_error")),
        }
    }

    /// Start an explicit close. Closing an already closing or closed session
    /// is a no-op, not an error.
    pub fn begin_close(&mut self) -> Option<ChatEvent> {
        match self.state {
            ChannelState::Closing | ChannelState::Closed | ChannelState::Idle => None,
            _ => {
                self.state = ChannelState::Closing;
                Some(state_changed(self.state))
            }
        }
    }

    /// Closure completed (local teardown or transport-signalled). Idempotent.
    pub fn on_closed(&mut self) -> Option<ChatEvent> {
        match self.state {
            ChannelState::Closed | ChannelState::Idle => None,
            _ => {
                self.state = ChannelState::Closed;
                Some(state_changed(self.state))
            }
        }
    }

    /// Full teardown back to `Idle` before rebinding to a new conversation.
    pub fn reset(&mut self) -> Option<ChatEvent> {
        if self.state == ChannelState::Idle {
            return None;
        }
        self.state = ChannelState::Idle;
        Some(state_changed(self.state))
    }

    fn transition(&mut self, next: ChannelState) -> Result<ChatEvent, ChatError> {
        self.state = next;
        Ok(state_changed(next))
    }
}

fn state_changed(state: ChannelState) -> ChatEvent {
    ChatEvent::StateChanged { state }
}
