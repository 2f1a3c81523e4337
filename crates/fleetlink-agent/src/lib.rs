//! Endpoint agent holding a persistent encrypted session to the control
//! server.
//!
//! Provides:
//! - `AgentSession` - Connect/handshake/register/command state machine
//! - `IdentityStore` - Durable slot for the server-assigned identity
//! - `HostProbe` - Host metadata for the registration hello
//! - `ShellExecutor` - Command execution with working-directory tracking

pub mod host;
pub mod identity;
pub mod session;
pub mod shell;

pub use host::{BasicHostProbe, HostProbe};
pub use identity::{FileIdentityStore, IdentityError, IdentityStore};
pub use session::{AgentConfig, AgentError, AgentSession};
pub use shell::ShellExecutor;
