use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded frame of the chat stream.
///
/// The server tags every payload with a `type` field; anything else is not an
/// event and never reaches the session engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Content {
        content: String,
    },
    ToolStart {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    ToolResult {
        tool: String,
        success: bool,
        #[serde(default)]
        result: String,
    },
    Error {
        message: String,
    },
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

impl StreamEvent {
    /// `complete` and `error` end an exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Outbound body of the chat POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}
