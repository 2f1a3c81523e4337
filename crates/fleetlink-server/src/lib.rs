//! Control server for a fleet of remote endpoint agents.
//!
//! Provides:
//! - `ControlServer` - Listener lifecycle, one session worker per agent
//! - `ConnectionRegistry` - Live sessions and response mailboxes
//! - `CommandDispatcher` - `run_command` request/response round trips
//! - `AgentStorage` - Record keeping behind a trait, with an in-memory
//!   implementation

pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;

pub use dispatcher::{CommandDispatcher, CommandOutcome};
pub use registry::{CommandReply, ConnectionRegistry, SessionHandle};
pub use server::{ControlServer, ServerConfig, ServerError};
pub use storage::{AgentRecord, AgentStorage, MemoryStorage, StorageError};
