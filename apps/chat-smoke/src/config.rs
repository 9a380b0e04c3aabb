//! Environment-backed runtime configuration for `chat-smoke`.

use std::{env, path::PathBuf};

use url::Url;

use chat_core::ChatInitConfig;

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    /// REST base URL of the chat backend.
    pub api_url: Url,
    /// Websocket base URL of the chat backend.
    pub ws_url: Url,
    /// Authentication token issued by the auth collaborator.
    pub token: String,
    /// Local user identity used to tag sends and match echoes.
    pub sender_id: String,
    /// Optional conversation to select; the first listed one is used when
    /// absent.
    pub conversation_id: Option<String>,
    /// Optional snapshot file for cross-run persistence.
    pub snapshot_path: Option<PathBuf>,
    /// Runtime tuning overrides forwarded to the runtime.
    pub init: ChatInitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    MissingValue { key: &'static str },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_url = required_url("CHAT_API_URL", &mut lookup)?;
        let ws_url = required_url("CHAT_WS_URL", &mut lookup)?;
        let token = required_trimmed("CHAT_TOKEN", &mut lookup)?;
        let sender_id = required_trimmed("CHAT_SENDER_ID", &mut lookup)?;
        let conversation_id = optional_trimmed("CHAT_CONVERSATION_ID", &mut lookup);
        let snapshot_path = optional_trimmed("CHAT_SNAPSHOT_PATH", &mut lookup).map(PathBuf::from);

        let init = ChatInitConfig {
            send_queue_capacity: parse_optional("CHAT_SEND_QUEUE_CAPACITY", &mut lookup)?,
            store_max_items: parse_optional("CHAT_STORE_MAX_ITEMS", &mut lookup)?,
            echo_window_ms: parse_optional("CHAT_ECHO_WINDOW_MS", &mut lookup)?,
            retry_base_delay_ms: parse_optional("CHAT_RETRY_BASE_DELAY_MS", &mut lookup)?,
            retry_max_delay_ms: parse_optional("CHAT_RETRY_MAX_DELAY_MS", &mut lookup)?,
            retry_max_attempts: parse_optional("CHAT_RETRY_MAX_ATTEMPTS", &mut lookup)?,
        };

        if init.send_queue_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_SEND_QUEUE_CAPACITY",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if init.store_max_items == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_STORE_MAX_ITEMS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            api_url,
            ws_url,
            token,
            sender_id,
            conversation_id,
            snapshot_path,
            init,
        })
    }
}

fn optional_trimmed<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_trimmed<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed(key, lookup).ok_or(ConfigError::MissingValue { key })
}

fn required_url<F>(key: &'static str, lookup: &mut F) -> Result<Url, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let raw = required_trimmed(key, lookup)?;
    Url::parse(&raw).map_err(|err| ConfigError::InvalidValue {
        key,
        value: raw,
        reason: err.to_string(),
    })
}

fn parse_optional<T, F>(key: &'static str, lookup: &mut F) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    match optional_trimmed(key, lookup) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: err.to_string(),
            }),
    }
}
