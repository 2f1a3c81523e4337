//! Agent record storage.
//!
//! Session workers upsert records on registration and flip them offline
//! on disconnect; the administrative layer reads snapshots. Persistence
//! beyond process lifetime sits behind [`AgentStorage`].

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetlink_proto::HostInfo;

/// Registration record for one known agent. Exactly one exists per
/// identity; reconnects update it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    /// Display name. Defaults to the hostname; renamable independently.
    pub name: String,
    /// Unix timestamp of the most recent registration.
    pub connected_at: i64,
    /// Peer address of the most recent connection.
    pub host: String,
    pub port: u16,
    pub online: bool,
    #[serde(flatten)]
    pub host_info: HostInfo,
}

impl AgentRecord {
    /// Record for a registration that just happened, marked online.
    #[must_use]
    pub fn connected(agent_id: String, peer: SocketAddr, host_info: HostInfo) -> Self {
        Self {
            agent_id,
            name: host_info.hostname.clone(),
            connected_at: now(),
            host: peer.ip().to_string(),
            port: peer.port(),
            online: true,
            host_info,
        }
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Internal(String),
}

/// Trait for agent record storage backends.
#[async_trait]
pub trait AgentStorage: Send + Sync {
    /// Insert the record, or replace the one with the same identity.
    async fn upsert(&self, record: AgentRecord) -> Result<(), StorageError>;

    /// Mark one agent offline.
    async fn set_offline(&self, agent_id: &str) -> Result<(), StorageError>;

    /// Mark every agent offline. Used on server shutdown.
    async fn set_all_offline(&self) -> Result<(), StorageError>;

    /// Change an agent's display name.
    async fn rename(&self, agent_id: &str, name: &str) -> Result<(), StorageError>;

    /// Get a record by identity.
    async fn get(&self, agent_id: &str) -> Result<Option<AgentRecord>, StorageError>;

    /// All known records, most recently connected first.
    async fn list(&self) -> Result<Vec<AgentRecord>, StorageError>;
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStorage {
    records: RwLock<HashMap<String, AgentRecord>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentStorage for MemoryStorage {
    async fn upsert(&self, record: AgentRecord) -> Result<(), StorageError> {
        self.records
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(record.agent_id.clone(), record);
        Ok(())
    }

    async fn set_offline(&self, agent_id: &str) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let record = records
            .get_mut(agent_id)
            .ok_or_else(|| StorageError::NotFound(agent_id.to_string()))?;
        record.online = false;
        Ok(())
    }

    async fn set_all_offline(&self) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        for record in records.values_mut() {
            record.online = false;
        }
        Ok(())
    }

    async fn rename(&self, agent_id: &str, name: &str) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let record = records
            .get_mut(agent_id)
            .ok_or_else(|| StorageError::NotFound(agent_id.to_string()))?;
        record.name = name.to_string();
        Ok(())
    }

    async fn get(&self, agent_id: &str) -> Result<Option<AgentRecord>, StorageError> {
        Ok(self
            .records
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(agent_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<AgentRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut result: Vec<AgentRecord> = records.values().cloned().collect();
        result.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        Ok(result)
    }
}
