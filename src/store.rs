use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EngineError;

/// Key/value persistence for the current session id. Survives restarts when
/// backed by disk.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, EngineError>;

    async fn set(&self, session_id: &str) -> Result<(), EngineError>;

    async fn remove(&self) -> Result<(), EngineError>;
}

// --- MemorySessionStore ---

/// In-process only. Forgotten on exit.
#[derive(Default)]
pub struct MemorySessionStore {
    current: RwLock<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(session_id.into())),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self) -> Result<Option<String>, EngineError> {
        Ok(self.current.read().await.clone())
    }

    async fn set(&self, session_id: &str) -> Result<(), EngineError> {
        *self.current.write().await = Some(session_id.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<(), EngineError> {
        *self.current.write().await = None;
        Ok(())
    }
}

// --- FileSessionStore ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    current_session_id: Option<String>,
}

/// Keeps the session id in a small JSON file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn write(&self, stored: &StoredSession) -> Result<(), EngineError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| EngineError::Store(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(stored)
            .map_err(|e| EngineError::Store(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self) -> Result<Option<String>, EngineError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => {
                let stored: StoredSession = serde_json::from_str(&json)
                    .map_err(|e| EngineError::Store(e.to_string()))?;
                Ok(stored.current_session_id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Store(e.to_string())),
        }
    }

    async fn set(&self, session_id: &str) -> Result<(), EngineError> {
        self.write(&StoredSession {
            current_session_id: Some(session_id.to_string()),
        })
        .await
    }

    async fn remove(&self) -> Result<(), EngineError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Store(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get().await.unwrap(), None);
        store.set("abc").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("abc"));
        store.remove().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        let store = FileSessionStore::new(&path);
        assert_eq!(store.get().await.unwrap(), None);
        store.set("abc123").await.unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.get().await.unwrap().as_deref(), Some("abc123"));

        reopened.remove().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
        // Removing twice is fine.
        reopened.remove().await.unwrap();
    }

    #[tokio::test]
    async fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = FileSessionStore::new(&path).get().await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }
}
