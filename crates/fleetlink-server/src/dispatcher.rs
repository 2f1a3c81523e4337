//! Command dispatch: one external call, one framed round trip.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use uuid::Uuid;

use fleetlink_proto::Message;

use crate::registry::ConnectionRegistry;

/// Result of a dispatched command, as reported to the administrative
/// layer.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub status: bool,
    pub response: Option<String>,
    pub cwd: Option<String>,
}

impl CommandOutcome {
    /// The agent is not connected (or the send to it failed).
    #[must_use]
    const fn unreachable() -> Self {
        Self {
            status: false,
            response: None,
            cwd: None,
        }
    }

    /// The agent is connected but did not answer in time.
    #[must_use]
    fn timed_out() -> Self {
        Self {
            status: false,
            response: Some("Error: command timed out.".to_string()),
            cwd: None,
        }
    }
}

/// Turns `run_command` calls into request frames and bounded waits on
/// the registry's mailboxes. Cheap to clone; safe to call concurrently,
/// including against the same agent.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    command_timeout: Duration,
}

impl CommandDispatcher {
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>, command_timeout: Duration) -> Self {
        Self {
            registry,
            command_timeout,
        }
    }

    /// Execute `command` on the agent holding `agent_id`.
    ///
    /// An unknown identity fails immediately with no I/O. A timeout
    /// fails the command, purges its mailbox slot, and leaves the
    /// session untouched; the agent may still be healthy but slow.
    pub async fn run_command(&self, agent_id: &str, command: &str) -> CommandOutcome {
        let Some(handle) = self.registry.lookup(agent_id).await else {
            tracing::debug!(%agent_id, "command for unconnected agent");
            return CommandOutcome::unreachable();
        };

        let request_id = Uuid::new_v4().to_string();
        let reply = self.registry.expect_reply(request_id.clone());

        let request = Message::Request {
            request_id: request_id.clone(),
            command: command.to_string(),
        };
        if let Err(e) = handle.send(&request).await {
            tracing::warn!(%agent_id, error = %e, "failed to send request");
            self.registry.abandon(&request_id);
            return CommandOutcome::unreachable();
        }
        tracing::debug!(%agent_id, %request_id, "request dispatched");

        match timeout(self.command_timeout, reply).await {
            Ok(Ok(reply)) => CommandOutcome {
                status: true,
                response: Some(reply.response),
                cwd: Some(reply.cwd),
            },
            // The sender was dropped without a reply; treat like a dead
            // session rather than a timeout.
            Ok(Err(_)) => {
                tracing::warn!(%agent_id, %request_id, "reply slot dropped");
                CommandOutcome::unreachable()
            }
            Err(_) => {
                tracing::warn!(%agent_id, %request_id, "command timed out");
                self.registry.abandon(&request_id);
                CommandOutcome::timed_out()
            }
        }
    }
}
