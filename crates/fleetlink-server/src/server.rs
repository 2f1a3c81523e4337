//! Listener lifecycle and server-wide state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use fleetlink_proto::timing;

use crate::dispatcher::CommandDispatcher;
use crate::registry::ConnectionRegistry;
use crate::session::handle_connection;
use crate::storage::{AgentStorage, StorageError};

/// Server-side configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// No frame from an agent for this long marks it offline.
    pub idle_timeout: Duration,
    /// Upper bound on a `run_command` round trip.
    pub command_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: timing::IDLE_TIMEOUT,
            command_timeout: timing::COMMAND_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Check the liveness invariant against the heartbeat interval the
    /// fleet's agents are configured with: the idle timeout must be at
    /// least twice the heartbeat interval, or healthy agents get marked
    /// offline whenever a single heartbeat is late.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidConfig` when the margin is too small.
    pub fn validate(&self, agent_heartbeat_interval: Duration) -> Result<(), ServerError> {
        if self.idle_timeout < agent_heartbeat_interval * 2 {
            return Err(ServerError::InvalidConfig(format!(
                "idle timeout {:?} must be at least twice the agent heartbeat interval {:?}",
                self.idle_timeout, agent_heartbeat_interval
            )));
        }
        Ok(())
    }
}

/// Server error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// The control server: owns the registry, the storage handle, and the
/// accept loop, with an explicit start/stop lifecycle.
///
/// Session workers and dispatcher calls share state only through the
/// registry and storage passed in here; there are no process globals.
pub struct ControlServer<S> {
    storage: Arc<S>,
    registry: Arc<ConnectionRegistry>,
    config: ServerConfig,
    state: Mutex<Option<Running>>,
}

impl<S> ControlServer<S>
where
    S: AgentStorage + 'static,
{
    pub fn new(storage: S, config: ServerConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            registry: Arc::new(ConnectionRegistry::new()),
            config,
            state: Mutex::new(None),
        }
    }

    /// The record store, for read-only snapshots by the admin layer.
    #[must_use]
    pub fn storage(&self) -> Arc<S> {
        Arc::clone(&self.storage)
    }

    /// The live session registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// A dispatcher bound to this server's registry.
    #[must_use]
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(Arc::clone(&self.registry), self.config.command_timeout)
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address, which matters when `addr` requests
    /// port 0.
    ///
    /// # Errors
    /// Fails if the server is already running or the bind fails.
    pub async fn start(&self, addr: &str) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let registry = Arc::clone(&self.registry);
        let storage = Arc::clone(&self.storage);
        let idle_timeout = self.config.idle_timeout;

        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::info!(%peer, "accepted connection");
                            tokio::spawn(handle_connection(
                                stream,
                                peer,
                                Arc::clone(&registry),
                                Arc::clone(&storage),
                                idle_timeout,
                            ));
                        }
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("accept loop stopped");
        });

        *state = Some(Running {
            local_addr,
            shutdown,
            accept_task,
        });
        tracing::info!(%local_addr, "server started");
        Ok(local_addr)
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Stop accepting, close every live session, and mark all records
    /// offline.
    ///
    /// # Errors
    /// Fails if the server is not running or the final storage sweep
    /// fails.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let running = self
            .state
            .lock()
            .await
            .take()
            .ok_or(ServerError::NotRunning)?;

        let _ = running.shutdown.send(true);
        let _ = running.accept_task.await;

        for handle in self.registry.drain().await {
            handle.shutdown().await;
        }
        self.storage.set_all_offline().await?;
        tracing::info!("server stopped");
        Ok(())
    }
}
