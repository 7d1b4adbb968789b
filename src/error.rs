#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("an exchange is already in progress")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
    #[error("session store error: {0}")]
    Store(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("tool catalog error: {0}")]
    Catalog(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("Agent is still connecting to MCP servers. Please wait a few seconds and try again.")]
    NotReady,
    #[error("HTTP error! status: {status}")]
    Http { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Why an exchange ended in `failing`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Remote(String),
}
