use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use chat_core::{ChatError, ChatErrorCategory, WireMessage};

const OUTBOUND_BUFFER: usize = 32;
const INBOUND_BUFFER: usize = 256;

/// Events surfaced by a live channel connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One raw inbound text frame, not yet parsed.
    Frame(String),
    /// The transport signalled orderly closure.
    Closed,
    /// The transport failed with a protocol or network error.
    Error(String),
}

/// Handles for one established live channel.
///
/// Outbound frames are raw content strings; the backend wraps them with
/// identity and timestamp on persist. Cancelling `shutdown` tears the
/// connection down and is idempotent.
pub struct ChannelConnection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
    pub shutdown: CancellationToken,
}

/// Connection seam for the live bidirectional channel, keyed by
/// `(conversation_id, auth_token)`.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> Result<ChannelConnection, ChatError>;
}

/// Websocket implementation of [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct WsChannelTransport {
    ws_base: Url,
}

impl WsChannelTransport {
    pub fn new(ws_base: Url) -> Self {
        Self { ws_base }
    }

    fn channel_url(&self, conversation_id: &str, token: &str) -> Result<Url, ChatError> {
        let mut url = self.ws_base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ChatError::new(
                    ChatErrorCategory::Config,
                    "invalid_ws_url",
                    format!("websocket base URL cannot carry path segments: {}", self.ws_base),
                )
            })?;
            path.pop_if_empty().extend(["chat", "room"]);
        }
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("chatid", conversation_id);
        Ok(url)
    }
}

#[async_trait]
impl ChannelTransport for WsChannelTransport {
    async fn connect(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> Result<ChannelConnection, ChatError> {
        let url = self.channel_url(conversation_id, token)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        debug!(%conversation_id, "live channel established");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let shutdown = CancellationToken::new();

        tokio::spawn(pump_channel(
            stream,
            outbound_rx,
            inbound_tx,
            shutdown.clone(),
        ));

        Ok(ChannelConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
            shutdown,
        })
    }
}

/// Bridge one websocket to the runtime's mpsc pair until either side ends
/// or the shutdown token fires.
async fn pump_channel(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound_rx: mpsc::Receiver<String>,
    inbound_tx: mpsc::Sender<TransportEvent>,
    shutdown: CancellationToken,
) {
    let (mut sink, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outbound = outbound_rx.recv() => match outbound {
                Some(content) => {
                    if sink.send(Message::Text(content)).await.is_err() {
                        let _ = inbound_tx
                            .send(TransportEvent::Error("websocket send failed".to_owned()))
                            .await;
                        break;
                    }
                }
                // Runtime dropped the sender: orderly local teardown.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!(bytes = text.len(), "inbound text frame");
                    if inbound_tx.send(TransportEvent::Frame(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = inbound_tx.send(TransportEvent::Closed).await;
                    break;
                }
                // Pings/pongs are answered by tungstenite; binary frames are
                // not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = inbound_tx
                        .send(TransportEvent::Error(err.to_string()))
                        .await;
                    break;
                }
            },
        }
    }
}

/// Parse one inbound frame. Malformed payloads yield a `Malformed` error the
/// caller logs and drops; they never reach the store or kill the session.
pub fn parse_frame(text: &str) -> Result<WireMessage, ChatError> {
    serde_json::from_str(text).map_err(|err| ChatError::malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_channel_url_with_token_and_conversation() {
        let transport =
            WsChannelTransport::new(Url::parse("wss://api.example.org").expect("ws base"));
        let url = transport.channel_url("c-1", "tok-9").expect("channel url");
        assert_eq!(
            url.as_str(),
            "wss://api.example.org/chat/room?token=tok-9&chatid=c-1"
        );
    }

    #[test]
    fn channel_url_keeps_base_path_prefix() {
        let transport =
            WsChannelTransport::new(Url::parse("wss://api.example.org/ws/").expect("ws base"));
        let url = transport.channel_url("c-2", "tok").expect("channel url");
        assert_eq!(
            url.as_str(),
            "wss://api.example.org/ws/chat/room?token=tok&chatid=c-2"
        );
    }

    #[test]
    fn parses_wellformed_frame() {
        let frame = parse_frame(
            r#"{"id":"m-1","timestamp":1200,"senderId":"bob","content":"yo","type":"received"}"#,
        )
        .expect("frame should parse");
        assert_eq!(frame.id, "m-1");
        assert_eq!(frame.timestamp, 1_200);
    }

    #[test]
    fn rejects_malformed_frame() {
        let err = parse_frame("definitely not json").expect_err("must fail");
        assert_eq!(err.code, "malformed_payload");

        let err = parse_frame(r#"{"id":"m-1"}"#).expect_err("missing fields must fail");
        assert_eq!(err.code, "malformed_payload");
    }
}
