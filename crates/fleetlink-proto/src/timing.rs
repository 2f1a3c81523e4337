//! Protocol intervals and timeouts shared by both ends.
//!
//! The liveness invariant: the server-side [`IDLE_TIMEOUT`] must exceed the
//! agent-side [`HEARTBEAT_INTERVAL`] by a factor of at least two, so that a
//! single delayed heartbeat never gets a healthy agent marked offline.
//! `ServerConfig::validate` in `fleetlink-server` enforces this for
//! non-default configurations.

use std::time::Duration;

/// How long an idle agent waits before sending a keepalive frame.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long the server waits for any frame before declaring an agent
/// offline. Must stay at or above `2 * HEARTBEAT_INTERVAL`.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Delay between agent reconnect attempts. Fixed, no backoff.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// How long a dispatched command waits for its response before failing.
/// A timeout fails the command only, never the session.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(25);
