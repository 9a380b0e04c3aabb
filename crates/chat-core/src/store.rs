use crate::types::{Message, MessageDirection, MessageId};

/// Default window for matching a live echo against a pending local send.
///
/// The pending entry carries the local submission clock while the echo
/// carries the backend clock, so the window absorbs both network latency and
/// moderate clock skew.
pub const DEFAULT_ECHO_WINDOW_MS: u64 = 15_000;

/// Ordered, deduplicated in-memory message collection for the currently
/// open conversation, with bounded item retention.
///
/// Arrival order from the network may differ from timestamp order, so every
/// insert resequences instead of appending. Two messages are considered the
/// same when their permanent identifiers match, or when an incoming arrival
/// looks like the live channel's echo of a still-pending local send (same
/// sender and content, timestamps within the echo window); the echo is
/// suppressed and its permanent identity grafted onto the pending entry.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    max_items: usize,
    echo_window_ms: u64,
}

impl MessageStore {
    /// Create a store with an item cap (`max_items >= 1`).
    pub fn new(max_items: usize) -> Self {
        Self::with_echo_window(max_items, DEFAULT_ECHO_WINDOW_MS)
    }

    /// Create a store with an explicit echo-match window.
    pub fn with_echo_window(max_items: usize, echo_window_ms: u64) -> Self {
        Self {
            messages: Vec::new(),
            max_items: max_items.max(1),
            echo_window_ms,
        }
    }

    /// Add a message unless an entry with the same identity already exists.
    /// Returns whether an insertion occurred.
    pub fn insert(&mut self, message: Message) -> bool {
        match &message.id {
            MessageId::Permanent(id) => {
                if self.contains_permanent(id) {
                    return false;
                }
                if let Some(index) = self.find_echo_candidate(&message) {
                    // Echo of a pending send: graft the permanent identity
                    // onto the optimistic entry instead of adding a row.
                    let pending = &mut self.messages[index];
                    pending.id = message.id;
                    pending.timestamp_ms = message.timestamp_ms;
                    return false;
                }
            }
            MessageId::Temporary(id) => {
                if self.contains_temporary(id) {
                    return false;
                }
            }
        }

        let at = self
            .messages
            .partition_point(|existing| existing.timestamp_ms <= message.timestamp_ms);
        self.messages.insert(at, message);
        self.trim_to_max();
        true
    }

    /// Swap a pending send for its confirmed form once the backend reports a
    /// permanent identifier, preserving the display position. If the echo
    /// already landed under that permanent identifier, the temporary entry is
    /// removed instead so no duplicate is ever created. Returns whether the
    /// store changed.
    pub fn replace_temporary(&mut self, temp_id: &str, confirmed: Message) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| matches!(&m.id, MessageId::Temporary(id) if id == temp_id))
        else {
            return false;
        };

        if let MessageId::Permanent(permanent) = &confirmed.id
            && self.contains_permanent(permanent)
        {
            self.messages.remove(index);
            return true;
        }

        self.messages[index] = confirmed;
        true
    }

    /// Drop a pending send (used when backpressure discards a queued send).
    pub fn remove_temporary(&mut self, temp_id: &str) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| matches!(&m.id, MessageId::Temporary(id) if id == temp_id))
        else {
            return false;
        };
        self.messages.remove(index);
        true
    }

    /// Empty the store (conversation switch, history delete).
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages in non-decreasing timestamp order. The iterator is lazy and
    /// restartable; call again for a fresh pass.
    pub fn all(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    /// Catch-up cursor: the timestamp of the most recent permanently
    /// identified message. Pending sends carry the local clock and must not
    /// advance the cursor.
    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.messages
            .iter()
            .filter(|m| !m.id.is_temporary())
            .map(|m| m.timestamp_ms)
            .max()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clone the current contents for persistence.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Replace the contents from a persisted snapshot, re-running dedup and
    /// resequencing on the way in.
    pub fn restore(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        for message in messages {
            self.insert(message);
        }
    }

    fn contains_permanent(&self, id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(&m.id, MessageId::Permanent(existing) if existing == id))
    }

    fn contains_temporary(&self, id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(&m.id, MessageId::Temporary(existing) if existing == id))
    }

    fn find_echo_candidate(&self, incoming: &Message) -> Option<usize> {
        self.messages.iter().position(|pending| {
            pending.id.is_temporary()
                && pending.direction == MessageDirection::Sent
                && pending.sender_id == incoming.sender_id
                && pending.content == incoming.content
                && pending.timestamp_ms.abs_diff(incoming.timestamp_ms) <= self.echo_window_ms
        })
    }

    fn trim_to_max(&mut self) {
        if self.messages.len() <= self.max_items {
            return;
        }

        let excess = self.messages.len() - self.max_items;
        self.messages.drain(0..excess);
    }
}
