use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::{
    sync::mpsc,
    time::{self, Instant},
};
use tracing::{debug, info, trace, warn};

use chat_core::{
    ChannelState, ChannelStateMachine, ChatChannelError, ChatChannels, ChatCommand, ChatError,
    ChatErrorCategory, ChatEvent, ChatInitConfig, ConversationSummary, EventStream, Message,
    MessageDirection, MessageId, MessageStore, QueuedSend, RetryPolicy, SendQueue, SyncStatus,
    normalize_fatal_error, normalize_send_outcome, SendOutcome,
};
use chat_platform::{SnapshotStore, StoreSnapshot};
use tokio_util::sync::CancellationToken;

use crate::{
    rest::ConversationApi,
    socket::{ChannelTransport, TransportEvent, parse_frame},
};

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 512;
const DEFAULT_SEND_QUEUE_CAPACITY: usize = 32;
const DEFAULT_STORE_MAX_ITEMS: usize = 1_200;

/// Runtime construction parameters.
///
/// The auth token is owned by the auth collaborator and read-only here; a
/// missing or expired token is a fatal precondition for opening a channel,
/// never something this core refreshes.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Token used to establish channel and REST calls.
    pub auth_token: String,
    /// Local user identity, used to tag pending sends and match echoes.
    pub local_sender_id: String,
    /// Optional tuning overrides.
    pub init: ChatInitConfig,
    /// Optional persistence port for cross-reload continuity.
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl RuntimeConfig {
    pub fn new(auth_token: impl Into<String>, local_sender_id: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            local_sender_id: local_sender_id.into(),
            init: ChatInitConfig::default(),
            snapshot_store: None,
        }
    }
}

/// Cloneable handle over the runtime's command/event channels.
#[derive(Clone)]
pub struct ChatRuntimeHandle {
    channels: ChatChannels,
}

impl ChatRuntimeHandle {
    pub async fn send(&self, command: ChatCommand) -> Result<(), ChatChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Spawn the runtime task and return its handle.
pub fn spawn_runtime(
    config: RuntimeConfig,
    api: Arc<dyn ConversationApi>,
    transport: Arc<dyn ChannelTransport>,
) -> ChatRuntimeHandle {
    let (channels, command_rx) = ChatChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let runtime = ChatRuntime::new(channels.clone(), command_rx, config, api, transport);
    tokio::spawn(async move {
        runtime.run().await;
    });

    ChatRuntimeHandle { channels }
}

#[derive(Debug)]
struct LiveSession {
    conversation_id: String,
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<TransportEvent>,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
struct ReconnectTimer {
    attempt: u32,
    at: Instant,
}

enum Tick {
    Command(Option<ChatCommand>),
    Transport(Option<TransportEvent>),
    Retry,
}

struct ChatRuntime {
    channels: ChatChannels,
    command_rx: mpsc::Receiver<ChatCommand>,
    auth_token: String,
    local_sender_id: String,
    api: Arc<dyn ConversationApi>,
    transport: Arc<dyn ChannelTransport>,
    machine: ChannelStateMachine,
    store: MessageStore,
    queue: SendQueue,
    retry: RetryPolicy,
    conversations: Vec<ConversationSummary>,
    active: Option<String>,
    // Whether the active conversation's history has been seeded. A pending
    // send in the store must not make the runtime skip the initial fetch.
    history_synced: bool,
    session: Option<LiveSession>,
    reconnect: Option<ReconnectTimer>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl ChatRuntime {
    fn new(
        channels: ChatChannels,
        command_rx: mpsc::Receiver<ChatCommand>,
        config: RuntimeConfig,
        api: Arc<dyn ConversationApi>,
        transport: Arc<dyn ChannelTransport>,
    ) -> Self {
        let init = config.init;
        let max_items = init.store_max_items.unwrap_or(DEFAULT_STORE_MAX_ITEMS);
        let store = match init.echo_window_ms {
            Some(window) => MessageStore::with_echo_window(max_items, window),
            None => MessageStore::new(max_items),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            init.retry_base_delay_ms.unwrap_or(defaults.base_delay_ms()),
            init.retry_max_delay_ms.unwrap_or(defaults.max_delay_ms()),
            init.retry_max_attempts.unwrap_or(defaults.max_attempts()),
        );

        Self {
            channels,
            command_rx,
            auth_token: config.auth_token,
            local_sender_id: config.local_sender_id,
            api,
            transport,
            machine: ChannelStateMachine::default(),
            store,
            queue: SendQueue::new(
                init.send_queue_capacity
                    .unwrap_or(DEFAULT_SEND_QUEUE_CAPACITY),
            ),
            retry,
            conversations: Vec::new(),
            active: None,
            history_synced: false,
            session: None,
            reconnect: None,
            snapshot_store: config.snapshot_store,
        }
    }

    async fn run(mut self) {
        self.restore_snapshot();

        loop {
            let tick = {
                let reconnect_at = self.reconnect.as_ref().map(|timer| timer.at);
                tokio::select! {
                    command = self.command_rx.recv() => Tick::Command(command),
                    event = recv_transport(&mut self.session) => Tick::Transport(event),
                    _ = wait_until(reconnect_at) => Tick::Retry,
                }
            };

            match tick {
                Tick::Command(Some(command)) => {
                    if let Err(err) = self.handle_command(command).await {
                        let recoverable = is_recoverable(&err);
                        self.channels.emit(normalize_fatal_error(err, recoverable));
                    }
                }
                Tick::Command(None) => break,
                Tick::Transport(Some(event)) => self.handle_transport_event(event),
                Tick::Transport(None) => self.handle_transport_failure("channel stream ended"),
                Tick::Retry => self.run_retry_attempt().await,
            }
        }

        self.teardown_session(false);
        self.persist();
    }

    async fn handle_command(&mut self, command: ChatCommand) -> Result<(), ChatError> {
        match command {
            ChatCommand::ListConversations => self.handle_list_conversations().await,
            ChatCommand::SelectConversation { conversation_id } => {
                self.handle_select(conversation_id).await
            }
            ChatCommand::CreateConversation {
                display_name,
                seed_payload,
            } => self.handle_create(display_name, seed_payload).await,
            ChatCommand::RenameConversation {
                conversation_id,
                display_name,
            } => self.handle_rename(conversation_id, display_name).await,
            ChatCommand::DeleteConversation { conversation_id } => {
                self.handle_delete(conversation_id).await
            }
            ChatCommand::SendMessage {
                client_txn_id,
                content,
            } => {
                self.handle_send(client_txn_id, content).await;
                Ok(())
            }
            ChatCommand::Disconnect => {
                debug!("explicit disconnect");
                self.teardown_session(false);
                Ok(())
            }
        }
    }

    async fn handle_list_conversations(&mut self) -> Result<(), ChatError> {
        self.conversations = self.api.list_conversations().await?;
        self.emit_conversations();
        Ok(())
    }

    async fn handle_select(&mut self, conversation_id: String) -> Result<(), ChatError> {
        debug!(%conversation_id, "selecting conversation");

        // History-before-open: the old session goes down and the store is
        // emptied before anything about the new conversation is fetched, so
        // messages never bleed across the switch.
        self.teardown_session(true);
        self.store.clear();
        self.history_synced = false;
        self.active = Some(conversation_id);
        self.emit_active();
        self.emit_timeline();
        self.persist();

        self.bring_up().await
    }

    async fn handle_create(
        &mut self,
        display_name: Option<String>,
        seed_payload: Option<serde_json::Value>,
    ) -> Result<(), ChatError> {
        let summary = self.api.create_conversation(display_name, seed_payload).await?;
        info!(conversation_id = %summary.conversation_id, "conversation created");
        self.conversations.insert(0, summary.clone());
        self.emit_conversations();
        self.handle_select(summary.conversation_id).await
    }

    async fn handle_rename(
        &mut self,
        conversation_id: String,
        display_name: String,
    ) -> Result<(), ChatError> {
        self.api
            .update_metadata(&conversation_id, &display_name)
            .await?;

        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id)
        {
            conversation.display_name = display_name;
        }
        self.emit_conversations();
        Ok(())
    }

    async fn handle_delete(&mut self, conversation_id: String) -> Result<(), ChatError> {
        self.api.delete_conversation(&conversation_id).await?;
        info!(%conversation_id, "conversation deleted");
        self.conversations
            .retain(|c| c.conversation_id != conversation_id);
        self.emit_conversations();

        if self.active.as_deref() == Some(conversation_id.as_str()) {
            self.teardown_session(false);
            self.store.clear();
            self.history_synced = false;
            self.active = None;
            self.channels.emit(ChatEvent::TimelineUpdated {
                conversation_id,
                messages: Vec::new(),
            });
            self.emit_active();
            self.persist();
        }
        Ok(())
    }

    async fn handle_send(&mut self, client_txn_id: String, content: String) {
        let state = self.machine.state();
        if self.active.is_none()
            || matches!(state, ChannelState::Closing | ChannelState::Closed)
        {
            self.channels.emit(normalize_send_outcome(
                client_txn_id,
                SendOutcome::Failure {
                    error: ChatError::invalid_state(state, "send"),
                },
            ));
            return;
        }

        // Optimistic insert under the client transaction ID; the echo or an
        // explicit ack later swaps in the permanent identity.
        let pending = Message {
            id: MessageId::Temporary(client_txn_id.clone()),
            sender_id: self.local_sender_id.clone(),
            content: content.clone(),
            timestamp_ms: now_ms(),
            direction: MessageDirection::Sent,
        };
        self.store.insert(pending);
        self.emit_timeline();

        if state == ChannelState::Open {
            self.deliver(client_txn_id, content).await;
        } else {
            // Connecting / Errored / Idle-with-retry-armed: hold the send
            // until the channel opens so a user typing right after opening a
            // conversation does not lose their message.
            self.enqueue(QueuedSend {
                client_txn_id,
                content,
            });
        }
        self.persist();
    }

    async fn deliver(&mut self, client_txn_id: String, content: String) {
        let outbound = match &self.session {
            Some(live) => live.outbound.clone(),
            None => {
                self.enqueue(QueuedSend {
                    client_txn_id,
                    content,
                });
                return;
            }
        };

        if outbound.send(content.clone()).await.is_ok() {
            trace!(txn = %client_txn_id, "send handed to channel");
            self.channels.emit(normalize_send_outcome(
                client_txn_id,
                SendOutcome::Success { message_id: None },
            ));
        } else {
            self.enqueue(QueuedSend {
                client_txn_id,
                content,
            });
            self.handle_transport_failure("websocket writer is gone");
        }
    }

    fn enqueue(&mut self, send: QueuedSend) {
        if let Some(dropped) = self.queue.push(send) {
            debug!(txn = %dropped.client_txn_id, "send queue overflow, dropping oldest");
            self.store.remove_temporary(&dropped.client_txn_id);
            self.emit_timeline();
            self.channels.emit(ChatEvent::Backpressure {
                dropped_client_txn_id: dropped.client_txn_id,
            });
        }
    }

    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let queued = self.queue.drain();
        debug!(count = queued.len(), "flushing queued sends");
        let mut pending = queued.into_iter();
        while let Some(send) = pending.next() {
            let outbound = match &self.session {
                Some(live) => live.outbound.clone(),
                None => {
                    self.queue.requeue_front(send);
                    for rest in pending {
                        self.queue.push(rest);
                    }
                    return;
                }
            };

            if outbound.send(send.content.clone()).await.is_ok() {
                self.channels.emit(normalize_send_outcome(
                    send.client_txn_id,
                    SendOutcome::Success { message_id: None },
                ));
            } else {
                self.queue.requeue_front(send);
                for rest in pending {
                    self.queue.push(rest);
                }
                self.handle_transport_failure("websocket writer is gone");
                return;
            }
        }
    }

    /// Bring the active conversation up: seed history when the store is
    /// empty, open the channel, fill any reconnect gap, flush held sends.
    /// Recoverable failures arm the supervisor instead of surfacing.
    async fn bring_up(&mut self) -> Result<(), ChatError> {
        match self.try_bring_up().await {
            Ok(()) => Ok(()),
            Err(err) if is_recoverable(&err) => {
                let hint = err.retry_after_ms;
                self.arm_retry(0, hint, &err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn try_bring_up(&mut self) -> Result<(), ChatError> {
        let Some(conversation_id) = self.active.clone() else {
            return Ok(());
        };

        let mut seeded_now = false;
        if !self.history_synced {
            let rows = self.api.fetch_history(&conversation_id).await?;
            if self.active.as_deref() != Some(conversation_id.as_str()) {
                // Conversation switched while the fetch was in flight; the
                // result belongs to a conversation we no longer show.
                return Ok(());
            }
            debug!(%conversation_id, rows = rows.len(), "history seeded");
            self.seed_rows(rows);
            self.history_synced = true;
            self.emit_timeline();
            self.persist();
            seeded_now = true;
        }

        let event = self.machine.begin_connect(&self.auth_token)?;
        self.channels.emit(event);

        let connection = match self
            .transport
            .connect(&conversation_id, &self.auth_token)
            .await
        {
            Ok(connection) => connection,
            Err(err) => {
                if let Ok(event) = self.machine.on_transport_error() {
                    self.channels.emit(event);
                }
                return Err(err);
            }
        };

        if self.active.as_deref() != Some(conversation_id.as_str()) {
            connection.shutdown.cancel();
            return Ok(());
        }

        let event = self.machine.on_open()?;
        self.channels.emit(event);
        self.session = Some(LiveSession {
            conversation_id: conversation_id.clone(),
            outbound: connection.outbound,
            inbound: connection.inbound,
            shutdown: connection.shutdown,
        });
        self.reconnect = None;

        // Reconnect gap fill. The channel is already delivering, so overlap
        // with the fetch is possible; the store's dedup absorbs it. Failure
        // here is tolerable: the data on screen stays stale-but-present and
        // the next error cycle resyncs.
        if !seeded_now && let Some(cursor) = self.store.last_timestamp_ms() {
            match self.api.fetch_since(&conversation_id, cursor).await {
                Ok(rows) => {
                    if self.active.as_deref() == Some(conversation_id.as_str()) {
                        debug!(%conversation_id, rows = rows.len(), cursor, "gap fill applied");
                        self.seed_rows(rows);
                        self.emit_timeline();
                        self.persist();
                    }
                }
                Err(err) => {
                    warn!(code = %err.code, "catch-up fetch failed after reconnect");
                }
            }
        }

        self.channels.emit(ChatEvent::SyncStatus(SyncStatus {
            running: true,
            retry_hint_ms: None,
        }));
        self.flush_queue().await;
        Ok(())
    }

    async fn run_retry_attempt(&mut self) {
        let Some(timer) = self.reconnect.take() else {
            return;
        };
        if self.active.is_none() {
            return;
        }

        match self.try_bring_up().await {
            Ok(()) => {}
            Err(err) if err.category == ChatErrorCategory::Auth => {
                self.channels.emit(normalize_fatal_error(err, false));
            }
            Err(err) => {
                let next = timer.attempt.saturating_add(1);
                if self.retry.is_exhausted(next) {
                    warn!(attempts = next, code = %err.code, "retry budget exhausted");
                    self.channels.emit(normalize_fatal_error(err, false));
                    self.channels.emit(ChatEvent::SyncStatus(SyncStatus {
                        running: false,
                        retry_hint_ms: None,
                    }));
                } else {
                    let hint = err.retry_after_ms;
                    self.arm_retry(next, hint, &err);
                }
            }
        }
    }

    fn arm_retry(&mut self, attempt: u32, hint: Option<u64>, err: &ChatError) {
        let delay = self.retry.delay_for_attempt(attempt, hint);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            code = %err.code,
            "scheduling reconnect attempt"
        );
        self.reconnect = Some(ReconnectTimer {
            attempt,
            at: Instant::now() + delay,
        });
        self.channels.emit(ChatEvent::SyncStatus(SyncStatus {
            running: true,
            retry_hint_ms: Some(delay.as_millis() as u64),
        }));
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => self.handle_inbound_frame(text),
            TransportEvent::Closed => self.handle_transport_failure("channel closed by transport"),
            TransportEvent::Error(message) => self.handle_transport_failure(&message),
        }
    }

    fn handle_inbound_frame(&mut self, text: String) {
        match parse_frame(&text) {
            Ok(frame) => {
                trace!(message_id = %frame.id, "inbound frame");
                let message = frame.into_message(&self.local_sender_id);
                self.store.insert(message);
                self.emit_timeline();
                self.persist();
            }
            Err(err) => {
                warn!(code = %err.code, "dropping malformed inbound frame");
            }
        }
    }

    fn handle_transport_failure(&mut self, reason: &str) {
        let Some(live) = self.session.take() else {
            return;
        };
        live.shutdown.cancel();
        warn!(conversation_id = %live.conversation_id, %reason, "live channel lost");

        if let Ok(event) = self.machine.on_transport_error() {
            self.channels.emit(event);
        }
        let err = ChatError::transport(reason);
        self.arm_retry(0, None, &err);
    }

    fn teardown_session(&mut self, rebind: bool) {
        let was_bound = !matches!(self.machine.state(), ChannelState::Idle);

        if let Some(live) = self.session.take() {
            live.shutdown.cancel();
        }
        self.queue.clear();
        self.reconnect = None;

        if let Some(event) = self.machine.begin_close() {
            self.channels.emit(event);
        }
        if let Some(event) = self.machine.on_closed() {
            self.channels.emit(event);
        }
        if rebind && let Some(event) = self.machine.reset() {
            self.channels.emit(event);
        }

        if was_bound {
            self.channels.emit(ChatEvent::SyncStatus(SyncStatus {
                running: false,
                retry_hint_ms: None,
            }));
        }
    }

    fn seed_rows(&mut self, rows: Vec<chat_core::WireMessage>) {
        for row in rows {
            self.store.insert(row.into_message(&self.local_sender_id));
        }
    }

    fn emit_timeline(&self) {
        let Some(conversation_id) = self.active.clone() else {
            return;
        };
        self.channels.emit(ChatEvent::TimelineUpdated {
            conversation_id,
            messages: self.store.snapshot(),
        });
    }

    fn emit_active(&self) {
        self.channels.emit(ChatEvent::ActiveConversationChanged {
            conversation_id: self.active.clone(),
        });
    }

    fn emit_conversations(&self) {
        self.channels.emit(ChatEvent::ConversationListUpdated {
            conversations: self.conversations.clone(),
        });
    }

    fn persist(&self) {
        let Some(store) = &self.snapshot_store else {
            return;
        };
        let snapshot = StoreSnapshot {
            active_conversation_id: self.active.clone(),
            messages: self.store.snapshot(),
        };
        if let Err(err) = store.save(&snapshot) {
            warn!(%err, "failed to persist message snapshot");
        }
    }

    fn restore_snapshot(&mut self) {
        let Some(store) = &self.snapshot_store else {
            return;
        };
        match store.load() {
            Ok(Some(snapshot)) if snapshot.active_conversation_id.is_some() => {
                info!(
                    conversation_id = ?snapshot.active_conversation_id,
                    messages = snapshot.messages.len(),
                    "restored persisted session"
                );
                self.active = snapshot.active_conversation_id;
                self.store.restore(snapshot.messages);
                self.history_synced = true;
                self.emit_active();
                self.emit_timeline();
                // Resume straight away: the supervisor reopens the channel
                // and fills the gap since the snapshot.
                self.reconnect = Some(ReconnectTimer {
                    attempt: 0,
                    at: Instant::now(),
                });
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "failed to load persisted snapshot"),
        }
    }
}

async fn recv_transport(session: &mut Option<LiveSession>) -> Option<TransportEvent> {
    match session {
        Some(live) => live.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn is_recoverable(err: &ChatError) -> bool {
    matches!(
        err.category,
        ChatErrorCategory::Transport | ChatErrorCategory::Sync
    )
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
