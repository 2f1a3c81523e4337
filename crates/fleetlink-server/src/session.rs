//! Per-connection session worker.
//!
//! One worker per accepted connection: handshake, registration upsert,
//! then a receive loop that routes response and heartbeat frames until
//! the agent goes quiet, disconnects, or misbehaves. Every exit path
//! tears down only this session; a new worker is spawned when the agent
//! reconnects.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

use fleetlink_proto::{Message, ProtocolError, handshake_responder, recv_message};

use crate::registry::{CommandReply, ConnectionRegistry, SessionHandle};
use crate::storage::{AgentRecord, AgentStorage};

pub(crate) async fn handle_connection<S>(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    storage: Arc<S>,
    idle_timeout: Duration,
) where
    S: AgentStorage + 'static,
{
    let key = match handshake_responder(&mut stream).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "handshake failed");
            return;
        }
    };

    // Registration: the first frame must be an agent-hello, inside the
    // same liveness window as everything else.
    let hello = match timeout(idle_timeout, recv_message(&mut stream, &key)).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            tracing::warn!(%peer, error = %e, "failed to read agent-hello");
            return;
        }
        Err(_) => {
            tracing::warn!(%peer, "timed out waiting for agent-hello");
            return;
        }
    };
    let Message::AgentHello { host, agent_id } = hello else {
        tracing::warn!(%peer, "first frame was not agent-hello, dropping connection");
        return;
    };

    let minted = agent_id.is_none();
    let agent_id = agent_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if minted {
        tracing::info!(%peer, %agent_id, "minted identity for new agent");
    }

    if let Err(e) = storage
        .upsert(AgentRecord::connected(agent_id.clone(), peer, host))
        .await
    {
        tracing::error!(%agent_id, error = %e, "failed to upsert agent record");
        return;
    }

    let (mut reader, writer) = stream.into_split();
    let handle = SessionHandle::new(writer, key.clone());
    let session_id = handle.session_id();

    if handle
        .send(&Message::ServerHello {
            agent_id: agent_id.clone(),
        })
        .await
        .is_err()
    {
        tracing::warn!(%agent_id, "failed to send server-hello");
        offline(&storage, &agent_id).await;
        return;
    }

    if let Some(superseded) = registry.register(&agent_id, handle).await {
        tracing::info!(%agent_id, "superseding existing session");
        superseded.shutdown().await;
    }
    tracing::info!(%agent_id, %peer, "agent online");

    // Receive loop. Any frame's arrival resets the liveness window.
    loop {
        match timeout(idle_timeout, recv_message(&mut reader, &key)).await {
            Ok(Ok(Message::Response {
                response_id,
                response,
                cwd,
            })) => {
                let delivered = registry.deliver(&response_id, CommandReply { response, cwd });
                if delivered {
                    tracing::debug!(%agent_id, %response_id, "response delivered");
                } else {
                    // Late reply after a dispatcher timeout, or an id we
                    // never issued.
                    tracing::debug!(%agent_id, %response_id, "response had no waiter");
                }
            }
            Ok(Ok(Message::Heartbeat)) => {
                tracing::trace!(%agent_id, "heartbeat");
            }
            Ok(Ok(other)) => {
                tracing::warn!(%agent_id, message = ?other, "unexpected frame, dropping session");
                break;
            }
            Ok(Err(ProtocolError::ConnectionClosed)) => {
                tracing::info!(%agent_id, "agent disconnected");
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!(%agent_id, error = %e, "session error");
                break;
            }
            Err(_) => {
                tracing::info!(%agent_id, "idle timeout, marking offline");
                break;
            }
        }
    }

    // A worker superseded by a newer connection must not touch the
    // refreshed registration.
    if registry.deregister(&agent_id, session_id).await {
        offline(&storage, &agent_id).await;
        tracing::info!(%agent_id, "agent offline");
    } else {
        tracing::debug!(%agent_id, "session already superseded, leaving record");
    }
}

async fn offline<S: AgentStorage>(storage: &Arc<S>, agent_id: &str) {
    if let Err(e) = storage.set_offline(agent_id).await {
        tracing::error!(%agent_id, error = %e, "failed to mark agent offline");
    }
}
