//! Durable identity slot.
//!
//! The server mints an identity on first contact; the agent persists it
//! and presents it on every reconnect so the server updates the existing
//! record instead of creating a new one.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Identity persistence error.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable read/write slot for the server-assigned identity.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the stored identity, if any.
    async fn load(&self) -> Result<Option<String>, IdentityError>;

    /// Persist an identity, overwriting any prior value.
    async fn save(&self, agent_id: &str) -> Result<(), IdentityError>;
}

/// Identity slot backed by a single file.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Create a store over the given file path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the user's config directory.
    #[must_use]
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fleetlink").join("agent-id"))
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<String>, IdentityError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, agent_id: &str) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, agent_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> FileIdentityStore {
        let path = std::env::temp_dir()
            .join(format!("fleetlink-identity-{}", Uuid::new_v4()))
            .join("agent-id");
        FileIdentityStore::new(path)
    }

    #[tokio::test]
    async fn missing_file_loads_none() {
        let store = temp_store();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = temp_store();
        store.save("11111111-2222-3333-4444-555555555555").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
        let _ = tokio::fs::remove_dir_all(store.path().parent().unwrap()).await;
    }

    #[tokio::test]
    async fn save_overwrites_prior_identity() {
        let store = temp_store();
        store.save("first").await.unwrap();
        store.save("second").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("second"));
        let _ = tokio::fs::remove_dir_all(store.path().parent().unwrap()).await;
    }

    #[tokio::test]
    async fn blank_file_loads_none() {
        let store = temp_store();
        store.save("  \n").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        let _ = tokio::fs::remove_dir_all(store.path().parent().unwrap()).await;
    }
}
