use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;

/// A tool the remote agent can call, as advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    /// MCP server the tool belongs to.
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input_schema: Value,
}

/// Lists the tools available to the agent.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn list(&self) -> Result<Vec<ToolDescriptor>, EngineError>;
}

#[derive(Deserialize)]
struct ToolsPayload {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Reads `GET {base_url}{tools_path}`.
pub struct HttpToolCatalog {
    client: reqwest::Client,
    base_url: String,
    tools_path: String,
}

impl HttpToolCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tools_path: "/api/tools".into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_tools_path(mut self, path: impl Into<String>) -> Self {
        self.tools_path = path.into();
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.tools_path)
    }
}

fn parse_tools(body: &str) -> Result<Vec<ToolDescriptor>, EngineError> {
    let payload: ToolsPayload =
        serde_json::from_str(body).map_err(|e| EngineError::Catalog(e.to_string()))?;
    Ok(payload.tools)
}

#[async_trait]
impl ToolCatalog for HttpToolCatalog {
    async fn list(&self) -> Result<Vec<ToolDescriptor>, EngineError> {
        let url = self.url();
        debug!(%url, "fetching tool list");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Catalog(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Catalog(format!(
                "tool list returned {}",
                status.as_u16()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| EngineError::Catalog(e.to_string()))?;
        parse_tools(&body)
    }
}
