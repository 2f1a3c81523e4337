//! Demo endpoint agent.
//!
//! Run with: cargo run -p agent-demo -- <server-host:port>
//!
//! Falls back to `FLEETLINK_SERVER_ADDR`, then 127.0.0.1:8080. The
//! assigned identity is persisted under the user config directory, so
//! the same record is updated across restarts.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetlink_agent::{AgentConfig, AgentSession, BasicHostProbe, FileIdentityStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let server_addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLEETLINK_SERVER_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let identity_path = FileIdentityStore::default_location()
        .ok_or_else(|| anyhow::anyhow!("no config directory available for the identity file"))?;
    tracing::info!(%server_addr, identity = %identity_path.display(), "agent starting");

    let session = AgentSession::new(
        AgentConfig::new(server_addr),
        FileIdentityStore::new(identity_path),
        BasicHostProbe,
    );
    session.run().await;
    Ok(())
}
