use async_trait::async_trait;
use reqwest::Response;
use url::Url;

use chat_core::{
    ChatError, ChatErrorCategory, ConversationSummary, WireMessage, classify_http_status,
};

/// Request/response seam against the durable chat backend.
///
/// `fetch_history` and `fetch_since` are idempotent and side-effect-free; on
/// failure they signal a recoverable sync condition rather than a fatal
/// error, and the caller may retry. The `since` cursor is always the
/// caller's own last-seen timestamp, never server-maintained state.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Full ordered message list for a conversation (used on first open).
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<WireMessage>, ChatError>;

    /// Messages strictly newer than the cursor (used to fill reconnect gaps).
    async fn fetch_since(
        &self,
        conversation_id: &str,
        since_timestamp_ms: u64,
    ) -> Result<Vec<WireMessage>, ChatError>;

    /// All conversations known to the backend for this user.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError>;

    /// Create a conversation, optionally seeded with a wizard payload.
    async fn create_conversation(
        &self,
        display_name: Option<String>,
        seed_payload: Option<serde_json::Value>,
    ) -> Result<ConversationSummary, ChatError>;

    /// Update a conversation's display name.
    async fn update_metadata(
        &self,
        conversation_id: &str,
        display_name: &str,
    ) -> Result<(), ChatError>;

    /// Delete a conversation and its message history.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError>;
}

/// HTTP implementation of [`ConversationApi`] with bearer-token auth.
#[derive(Debug, Clone)]
pub struct RestConversationApi {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl RestConversationApi {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChatError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ChatError::new(
                    ChatErrorCategory::Config,
                    "invalid_base_url",
                    format!("base URL cannot carry path segments: {}", self.base_url),
                )
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ChatError> {
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        decode_json(url, response).await
    }

    async fn expect_success(&self, url: Url, response: Response) -> Result<(), ChatError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status.as_u16(), &url))
        }
    }
}

#[async_trait]
impl ConversationApi for RestConversationApi {
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<WireMessage>, ChatError> {
        let url = self.endpoint(&["chat", conversation_id, "messages"])?;
        self.get_json(url).await.map_err(recoverable_sync)
    }

    async fn fetch_since(
        &self,
        conversation_id: &str,
        since_timestamp_ms: u64,
    ) -> Result<Vec<WireMessage>, ChatError> {
        let mut url = self.endpoint(&["chat", conversation_id, "sync-messages"])?;
        url.query_pairs_mut()
            .append_pair("since", &since_timestamp_ms.to_string());
        self.get_json(url).await.map_err(recoverable_sync)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let url = self.endpoint(&["chat", "chats"])?;
        self.get_json(url).await
    }

    async fn create_conversation(
        &self,
        display_name: Option<String>,
        seed_payload: Option<serde_json::Value>,
    ) -> Result<ConversationSummary, ChatError> {
        let url = self.endpoint(&["chat", "new"])?;

        let mut body = serde_json::Map::new();
        if let Some(name) = display_name {
            body.insert("displayName".to_owned(), serde_json::Value::String(name));
        }
        if let Some(seed) = seed_payload {
            body.insert("seedPayload".to_owned(), seed);
        }

        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        decode_json(url, response).await
    }

    async fn update_metadata(
        &self,
        conversation_id: &str,
        display_name: &str,
    ) -> Result<(), ChatError> {
        let url = self.endpoint(&["chat", conversation_id, "metadata"])?;
        let body = serde_json::json!({ "displayName": display_name });

        let response = self
            .http
            .put(url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        self.expect_success(url, response).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        let url = self.endpoint(&["chat", "delete", conversation_id])?;

        let response = self
            .http
            .delete(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        self.expect_success(url, response).await
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    url: Url,
    response: Response,
) -> Result<T, ChatError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &url));
    }

    response.json::<T>().await.map_err(|err| {
        ChatError::malformed(format!("response decode failed for {url}: {err}"))
    })
}

fn status_error(status: u16, url: &Url) -> ChatError {
    ChatError::new(
        classify_http_status(status),
        "http_status_error",
        format!("HTTP {status} from {url}"),
    )
}

/// History/sync fetch failures are recoverable (`sync_unavailable`) unless
/// the token itself was rejected — auth problems belong to the auth
/// collaborator and must not be retried here.
fn recoverable_sync(err: ChatError) -> ChatError {
    if err.category == ChatErrorCategory::Auth {
        err
    } else {
        ChatError::sync_unavailable(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> RestConversationApi {
        let base = Url::parse("https://api.example.org/v1").expect("base url");
        RestConversationApi::new(base, "token-1")
    }

    #[test]
    fn builds_history_endpoint() {
        let url = api()
            .endpoint(&["chat", "c-1", "messages"])
            .expect("endpoint");
        assert_eq!(url.as_str(), "https://api.example.org/v1/chat/c-1/messages");
    }

    #[test]
    fn builds_sync_endpoint_with_cursor() {
        let mut url = api()
            .endpoint(&["chat", "c-1", "sync-messages"])
            .expect("endpoint");
        url.query_pairs_mut().append_pair("since", "1700");
        assert_eq!(
            url.as_str(),
            "https://api.example.org/v1/chat/c-1/sync-messages?since=1700"
        );
    }

    #[test]
    fn trailing_slash_base_does_not_double_separators() {
        let base = Url::parse("https://api.example.org/v1/").expect("base url");
        let api = RestConversationApi::new(base, "token-1");
        let url = api.endpoint(&["chat", "chats"]).expect("endpoint");
        assert_eq!(url.as_str(), "https://api.example.org/v1/chat/chats");
    }

    #[test]
    fn sync_failures_are_recoverable_except_auth() {
        let transport = ChatError::transport("connection refused");
        let mapped = recoverable_sync(transport);
        assert_eq!(mapped.category, ChatErrorCategory::Sync);
        assert_eq!(mapped.code, "sync_unavailable");

        let auth = status_error(401, &Url::parse("https://api.example.org/x").expect("url"));
        let mapped = recoverable_sync(auth);
        assert_eq!(mapped.category, ChatErrorCategory::Auth);
    }

    #[test]
    fn status_errors_classify_by_code() {
        let url = Url::parse("https://api.example.org/x").expect("url");
        assert_eq!(status_error(503, &url).category, ChatErrorCategory::Sync);
        assert_eq!(status_error(404, &url).category, ChatErrorCategory::Config);
        assert_eq!(status_error(403, &url).category, ChatErrorCategory::Auth);
    }
}
