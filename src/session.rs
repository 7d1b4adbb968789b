use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message of a conversation, restored or recorded live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SessionMessage {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// RFC 3339, or a zone-less ISO timestamp read as UTC. Anything else is `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            })
    }))
}

/// Fetches the prior messages of a persisted session before any live
/// exchange begins.
#[async_trait]
pub trait SessionLoader: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Vec<SessionMessage>, EngineError>;
}

// --- NoSessionLoader ---

/// Nothing to restore.
pub struct NoSessionLoader;

#[async_trait]
impl SessionLoader for NoSessionLoader {
    async fn load(&self, _: &str) -> Result<Vec<SessionMessage>, EngineError> {
        Ok(Vec::new())
    }
}

// --- HttpSessionLoader ---

#[derive(Deserialize)]
struct SessionPayload {
    #[serde(default)]
    messages: Vec<SessionMessage>,
}

/// Reads `GET {base_url}{sessions_path}/{id}` and returns its `messages`.
pub struct HttpSessionLoader {
    client: reqwest::Client,
    base_url: String,
    sessions_path: String,
}

impl HttpSessionLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            sessions_path: "/api/sessions".into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_sessions_path(mut self, path: impl Into<String>) -> Self {
        self.sessions_path = path.into();
        self
    }

    fn url(&self, session_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            self.sessions_path,
            session_id
        )
    }
}

#[async_trait]
impl SessionLoader for HttpSessionLoader {
    async fn load(&self, session_id: &str) -> Result<Vec<SessionMessage>, EngineError> {
        let url = self.url(session_id);
        debug!(%url, "loading session");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Session(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Session(format!(
                "session {session_id} returned {}",
                status.as_u16()
            )));
        }

        let payload: SessionPayload = resp
            .json()
            .await
            .map_err(|e| EngineError::Session(e.to_string()))?;
        Ok(payload.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_reference_shape() {
        let json = r#"{
            "id": "abc",
            "title": "Session",
            "messages": [
                {"id": "1", "role": "user", "content": "hello", "timestamp": "2024-05-01T10:00:00Z", "metadata": {}},
                {"id": "2", "role": "assistant", "content": "Hi there"}
            ]
        }"#;
        let payload: SessionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[0].role, Role::User);
        assert!(payload.messages[0].timestamp.is_some());
        assert_eq!(payload.messages[1].content, "Hi there");
        assert_eq!(payload.messages[1].timestamp, None);
    }

    #[test]
    fn naive_and_bad_timestamps_do_not_fail() {
        let naive: SessionMessage = serde_json::from_str(
            r#"{"role": "user", "content": "x", "timestamp": "2024-05-01T10:00:00.123456"}"#,
        )
        .unwrap();
        assert!(naive.timestamp.is_some());

        let bad: SessionMessage =
            serde_json::from_str(r#"{"role": "user", "content": "x", "timestamp": "yesterday"}"#)
                .unwrap();
        assert_eq!(bad.timestamp, None);
    }

    #[test]
    fn url_joins_cleanly() {
        let loader = HttpSessionLoader::new("http://localhost:5000/");
        assert_eq!(loader.url("abc"), "http://localhost:5000/api/sessions/abc");
    }
}
