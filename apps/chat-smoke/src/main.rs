mod config;
mod logging;

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::info;
use uuid::Uuid;

use chat_client::{RestConversationApi, RuntimeConfig, WsChannelTransport, spawn_runtime};
use chat_core::{ChatCommand, ChatEvent};
use chat_platform::JsonFileSnapshotStore;

use config::SmokeConfig;

const OBSERVE_WINDOW: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    logging::init();

    let smoke = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            eprintln!("Required: CHAT_API_URL, CHAT_WS_URL, CHAT_TOKEN, CHAT_SENDER_ID");
            std::process::exit(1);
        }
    };

    let api = Arc::new(RestConversationApi::new(
        smoke.api_url.clone(),
        smoke.token.clone(),
    ));
    let transport = Arc::new(WsChannelTransport::new(smoke.ws_url.clone()));

    let mut runtime_config = RuntimeConfig::new(smoke.token.clone(), smoke.sender_id.clone());
    runtime_config.init = smoke.init.clone();
    if let Some(path) = &smoke.snapshot_path {
        runtime_config.snapshot_store = Some(Arc::new(JsonFileSnapshotStore::new(path.clone())));
    }

    let handle = spawn_runtime(runtime_config, api, transport);
    let mut events = handle.subscribe();

    if let Err(err) = handle.send(ChatCommand::ListConversations).await {
        eprintln!("Runtime unavailable: {err}");
        std::process::exit(1);
    }

    // Select the requested conversation, or the first one the backend lists.
    let conversation_id = match smoke.conversation_id.clone() {
        Some(id) => Some(id),
        None => {
            match timeout(Duration::from_secs(5), async {
                loop {
                    match events.recv().await {
                        Ok(ChatEvent::ConversationListUpdated { conversations }) => {
                            break conversations.first().map(|c| c.conversation_id.clone());
                        }
                        Ok(_) => continue,
                        Err(_) => break None,
                    }
                }
            })
            .await
            {
                Ok(found) => found,
                Err(_) => None,
            }
        }
    };

    let Some(conversation_id) = conversation_id else {
        println!("No conversation available; set CHAT_CONVERSATION_ID or create one first.");
        return;
    };

    info!(%conversation_id, "starting smoke run");
    let _ = handle
        .send(ChatCommand::SelectConversation {
            conversation_id: conversation_id.clone(),
        })
        .await;
    let _ = handle
        .send(ChatCommand::SendMessage {
            client_txn_id: Uuid::new_v4().to_string(),
            content: format!("chat-smoke ping ({conversation_id})"),
        })
        .await;

    // Observe runtime events for a short window, then exit.
    let _ = timeout(OBSERVE_WINDOW, async {
        loop {
            match events.recv().await {
                Ok(ChatEvent::StateChanged { state }) => println!("state: {state:?}"),
                Ok(ChatEvent::TimelineUpdated { messages, .. }) => {
                    println!("timeline: {} messages", messages.len());
                }
                Ok(ChatEvent::SendAck(ack)) => println!(
                    "send ack: txn={} error={:?}",
                    ack.client_txn_id, ack.error_code
                ),
                Ok(ChatEvent::SyncStatus(status)) => println!(
                    "sync: running={} retry_hint_ms={:?}",
                    status.running, status.retry_hint_ms
                ),
                Ok(ChatEvent::FatalError { code, message, .. }) => {
                    eprintln!("fatal: {code}: {message}");
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
    .await;

    println!("Smoke run finished.");
}
