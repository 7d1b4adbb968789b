use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::session::HttpSessionLoader;
use crate::tools::HttpToolCatalog;
use crate::transport::HttpTransport;

pub const ENV_BASE_URL: &str = "CHAT_STREAM_BASE_URL";
pub const ENV_SESSION_FILE: &str = "CHAT_STREAM_SESSION_FILE";
pub const ENV_CONNECT_TIMEOUT: &str = "CHAT_STREAM_CONNECT_TIMEOUT_SECS";

/// Where the agent lives and how to reach it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub chat_path: String,
    pub sessions_path: String,
    pub tools_path: String,
    /// Applies to connecting only. A streaming response has no overall deadline.
    pub connect_timeout: Option<Duration>,
    /// Persist the session id here; in memory when `None`.
    pub session_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            chat_path: "/api/chat".into(),
            sessions_path: "/api/sessions".into(),
            tools_path: "/api/tools".into(),
            connect_timeout: None,
            session_file: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CHAT_STREAM_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(path) = lookup(ENV_SESSION_FILE).filter(|v| !v.trim().is_empty()) {
            config.session_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.connect_timeout = Some(Duration::from_secs(secs)),
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid connect timeout"),
            }
        }

        config
    }

    /// Shared HTTP client honouring `connect_timeout`.
    pub fn http_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default http client");
            reqwest::Client::new()
        })
    }

    pub fn transport(&self, client: reqwest::Client) -> HttpTransport {
        HttpTransport::new(&self.base_url)
            .with_client(client)
            .with_chat_path(&self.chat_path)
    }

    pub fn session_loader(&self, client: reqwest::Client) -> HttpSessionLoader {
        HttpSessionLoader::new(&self.base_url)
            .with_client(client)
            .with_sessions_path(&self.sessions_path)
    }

    pub fn tool_catalog(&self, client: reqwest::Client) -> HttpToolCatalog {
        HttpToolCatalog::new(&self.base_url)
            .with_client(client)
            .with_tools_path(&self.tools_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.chat_path, "/api/chat");
        assert_eq!(config.tools_path, "/api/tools");
        assert!(config.connect_timeout.is_none());
        assert!(config.session_file.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, " http://agent:8080 "),
            (ENV_SESSION_FILE, "/tmp/session.json"),
            (ENV_CONNECT_TIMEOUT, "5"),
        ]));
        assert_eq!(config.base_url, "http://agent:8080");
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.json")));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let config = EngineConfig::from_lookup(lookup(&[(ENV_CONNECT_TIMEOUT, "soon")]));
        assert!(config.connect_timeout.is_none());
    }
}
