//! Live connection registry and response mailboxes.
//!
//! Two concurrent maps owned by one object with an explicit lifecycle,
//! shared between session workers and dispatcher calls:
//! - identity -> [`SessionHandle`] for the live connection;
//! - request id -> oneshot sender, fulfilled exactly once when the
//!   matching response frame arrives.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock, oneshot};
use uuid::Uuid;

use fleetlink_proto::{Message, ProtocolError, SessionKey, send_message};

/// Completed command payload delivered through a mailbox.
#[derive(Debug)]
pub struct CommandReply {
    pub response: String,
    pub cwd: String,
}

/// Write-side handle for one live session.
///
/// The write half sits behind a mutex: dispatcher calls targeting the
/// same agent from different tasks must not interleave frame bytes.
/// The `session_id` tags this particular connection so that a stale
/// worker cannot tear down its successor's registration.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    key: SessionKey,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(writer: OwnedWriteHalf, key: SessionKey) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            key,
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Send one frame over this session's socket.
    ///
    /// # Errors
    /// A failed send is fatal to the session; the caller reports failure
    /// and leaves teardown to the session worker.
    pub async fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        send_message(&mut *writer, &self.key, message).await
    }

    /// Half-close the socket, letting the session worker's read loop
    /// wind down on its own.
    pub async fn shutdown(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// Server-wide shared state for sessions and pending commands.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    mailboxes: StdMutex<HashMap<String, oneshot::Sender<CommandReply>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            mailboxes: StdMutex::new(HashMap::new()),
        }
    }

    /// Register a live session under an identity.
    ///
    /// Returns the superseded handle when the identity was already live;
    /// the caller is expected to shut it down.
    pub async fn register(&self, agent_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions
            .write()
            .await
            .insert(agent_id.to_string(), handle)
    }

    /// Remove a session, but only while the entry still belongs to
    /// `session_id`. Returns whether removal happened; a superseded
    /// worker gets `false` and must leave the record alone.
    pub async fn deregister(&self, agent_id: &str, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(agent_id)
            .is_some_and(|h| h.session_id == session_id)
        {
            sessions.remove(agent_id);
            true
        } else {
            false
        }
    }

    /// Handle for a live session, if the identity is connected.
    pub async fn lookup(&self, agent_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(agent_id).cloned()
    }

    /// Remove and return every live session. Used on server shutdown.
    pub async fn drain(&self) -> Vec<SessionHandle> {
        self.sessions.write().await.drain().map(|(_, h)| h).collect()
    }

    /// Park a mailbox slot for a request about to be sent.
    #[must_use]
    pub fn expect_reply(&self, request_id: String) -> oneshot::Receiver<CommandReply> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().unwrap().insert(request_id, tx);
        rx
    }

    /// Deliver a response into its mailbox. Returns `false` when no slot
    /// is waiting, e.g. after the dispatcher already timed out.
    pub fn deliver(&self, response_id: &str, reply: CommandReply) -> bool {
        let sender = self.mailboxes.lock().unwrap().remove(response_id);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Purge a mailbox slot whose reply is no longer wanted, so timed-out
    /// requests do not accumulate.
    pub fn abandon(&self, request_id: &str) {
        self.mailboxes.lock().unwrap().remove(request_id);
    }

    /// Number of requests still waiting for replies.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.mailboxes.lock().unwrap().len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
