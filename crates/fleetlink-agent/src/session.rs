//! Agent-side session state machine.
//!
//! One session instance per agent process. The lifecycle is
//! `Disconnected -> Connecting -> Handshaking -> Registering -> Ready`,
//! looping back to `Disconnected` on any failure: connect retries run
//! forever at a fixed interval, and every established connection derives
//! a fresh session key.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use fleetlink_proto::{
    Message, ProtocolError, handshake_initiator, recv_message, send_message, timing,
};

use crate::host::HostProbe;
use crate::identity::{IdentityError, IdentityStore};
use crate::shell::ShellExecutor;

/// Agent-side configuration.
///
/// `heartbeat_interval` must stay below half the server's idle timeout;
/// the shared defaults in `fleetlink_proto::timing` already satisfy this.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Control server address, `host:port`.
    pub server_addr: String,
    /// Delay between reconnect attempts. Fixed, no backoff.
    pub retry_interval: Duration,
    /// Idle time after which a keepalive frame is sent.
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    /// Configuration with protocol-default intervals.
    #[must_use]
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            retry_interval: timing::RETRY_INTERVAL,
            heartbeat_interval: timing::HEARTBEAT_INTERVAL,
        }
    }
}

/// Error that ends one connection's lifetime. Never fatal to the agent:
/// the outer loop reconnects.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("identity persistence failure: {0}")]
    Identity(#[from] IdentityError),
}

/// The agent's connect/handshake/register/command loop.
///
/// Single-threaded and strictly sequential: one outstanding request at a
/// time, and a command that never returns blocks the loop until the
/// server gives up on the connection. That blocking behavior is part of
/// the protocol contract, not an oversight.
pub struct AgentSession<I, P> {
    config: AgentConfig,
    identity: I,
    probe: P,
}

impl<I, P> AgentSession<I, P>
where
    I: IdentityStore,
    P: HostProbe,
{
    pub const fn new(config: AgentConfig, identity: I, probe: P) -> Self {
        Self {
            config,
            identity,
            probe,
        }
    }

    /// Run the state machine forever.
    ///
    /// Only returns if the caller cancels the task. Each iteration owns
    /// one connection from handshake to failure; the retry delay applies
    /// both between failed connect attempts and after a dropped session.
    pub async fn run(&self) {
        loop {
            let stream = self.connect().await;
            match self.serve_connection(stream).await {
                Ok(()) => tracing::info!("session closed"),
                Err(e) => tracing::warn!(error = %e, "session ended, reconnecting"),
            }
            sleep(self.config.retry_interval).await;
        }
    }

    /// `Disconnected -> Connecting`: dial until a connection succeeds.
    async fn connect(&self) -> TcpStream {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match TcpStream::connect(&self.config.server_addr).await {
                Ok(stream) => {
                    tracing::info!(addr = %self.config.server_addr, attempt, "connected");
                    return stream;
                }
                Err(e) => {
                    tracing::debug!(
                        addr = %self.config.server_addr,
                        attempt,
                        error = %e,
                        "connect failed, retrying"
                    );
                    sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// `Connecting -> Handshaking -> Registering -> Ready` for one
    /// connection. Any error drops the connection and reports why.
    async fn serve_connection(&self, mut stream: TcpStream) -> Result<(), AgentError> {
        let key = handshake_initiator(&mut stream).await?;

        let host = self.probe.probe().await;
        let agent_id = self.identity.load().await?;
        send_message(&mut stream, &key, &Message::AgentHello { host, agent_id }).await?;

        match recv_message(&mut stream, &key).await? {
            Message::ServerHello { agent_id } => {
                tracing::info!(%agent_id, "registered");
                self.identity.save(&agent_id).await?;
            }
            _ => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: "server-hello",
                }
                .into());
            }
        }

        let mut shell = ShellExecutor::new();
        loop {
            match timeout(
                self.config.heartbeat_interval,
                recv_message(&mut stream, &key),
            )
            .await
            {
                // Idle: keep the liveness window open.
                Err(_) => {
                    send_message(&mut stream, &key, &Message::Heartbeat).await?;
                    tracing::trace!("heartbeat sent");
                }
                Ok(Ok(Message::Request {
                    request_id,
                    command,
                })) => {
                    tracing::debug!(%request_id, "executing command");
                    let (response, cwd) = shell.run(&command).await;
                    send_message(
                        &mut stream,
                        &key,
                        &Message::Response {
                            response_id: request_id,
                            response,
                            cwd,
                        },
                    )
                    .await?;
                }
                Ok(Ok(Message::Heartbeat)) => {}
                Ok(Ok(_)) => {
                    return Err(ProtocolError::UnexpectedMessage {
                        expected: "request",
                    }
                    .into());
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BasicHostProbe;
    use crate::identity::FileIdentityStore;
    use std::path::PathBuf;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    use fleetlink_proto::{SessionKey, handshake_responder};

    fn temp_identity_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("fleetlink-session-{}", Uuid::new_v4()))
            .join("agent-id")
    }

    fn test_config(addr: std::net::SocketAddr, heartbeat: Duration) -> AgentConfig {
        AgentConfig {
            server_addr: addr.to_string(),
            retry_interval: Duration::from_millis(50),
            heartbeat_interval: heartbeat,
        }
    }

    fn spawn_agent(
        addr: std::net::SocketAddr,
        heartbeat: Duration,
        identity_path: PathBuf,
    ) -> tokio::task::JoinHandle<()> {
        let session = AgentSession::new(
            test_config(addr, heartbeat),
            FileIdentityStore::new(identity_path),
            BasicHostProbe,
        );
        tokio::spawn(async move { session.run().await })
    }

    async fn accept_and_register(
        listener: &TcpListener,
        agent_id: &str,
    ) -> (TcpStream, SessionKey) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let key = handshake_responder(&mut stream).await.unwrap();
        match recv_message(&mut stream, &key).await.unwrap() {
            Message::AgentHello { host, .. } => assert!(!host.hostname.is_empty()),
            other => panic!("expected agent-hello, got {other:?}"),
        }
        send_message(
            &mut stream,
            &key,
            &Message::ServerHello {
                agent_id: agent_id.to_string(),
            },
        )
        .await
        .unwrap();
        (stream, key)
    }

    #[tokio::test]
    async fn registers_persists_identity_and_executes_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let identity_path = temp_identity_path();

        let agent = spawn_agent(addr, Duration::from_secs(5), identity_path.clone());

        let (mut stream, key) = accept_and_register(&listener, "assigned-id").await;
        send_message(
            &mut stream,
            &key,
            &Message::Request {
                request_id: "r-1".into(),
                command: "echo agent-loop".into(),
            },
        )
        .await
        .unwrap();

        match recv_message(&mut stream, &key).await.unwrap() {
            Message::Response {
                response_id,
                response,
                cwd,
            } => {
                assert_eq!(response_id, "r-1");
                assert_eq!(response, "agent-loop\n");
                assert!(!cwd.is_empty());
            }
            other => panic!("expected response, got {other:?}"),
        }

        let persisted = FileIdentityStore::new(identity_path).load().await.unwrap();
        assert_eq!(persisted.as_deref(), Some("assigned-id"));
        agent.abort();
    }

    #[tokio::test]
    async fn idle_agent_sends_heartbeats() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let agent = spawn_agent(addr, Duration::from_millis(100), temp_identity_path());

        let (mut stream, key) = accept_and_register(&listener, "hb-id").await;
        let frame = timeout(Duration::from_secs(2), recv_message(&mut stream, &key))
            .await
            .expect("no heartbeat within window")
            .unwrap();
        assert_eq!(frame, Message::Heartbeat);
        agent.abort();
    }

    #[tokio::test]
    async fn reconnects_with_persisted_identity_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let agent = spawn_agent(addr, Duration::from_secs(5), temp_identity_path());

        let (stream, _key) = accept_and_register(&listener, "sticky-id").await;
        drop(stream);

        // The agent must dial again and present the identity it was given.
        let (mut stream, _) = listener.accept().await.unwrap();
        let key = handshake_responder(&mut stream).await.unwrap();
        match recv_message(&mut stream, &key).await.unwrap() {
            Message::AgentHello { agent_id, .. } => {
                assert_eq!(agent_id.as_deref(), Some("sticky-id"));
            }
            other => panic!("expected agent-hello, got {other:?}"),
        }
        agent.abort();
    }
}
