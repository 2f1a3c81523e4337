//! Demo control plane: the secure agent server plus a minimal admin API.
//!
//! Run with: cargo run -p control-plane-demo
//!
//! Agents dial the agent port (default 0.0.0.0:8080); the admin API
//! listens on 127.0.0.1:3000. Both are overridable via
//! `FLEETLINK_AGENT_ADDR` / `FLEETLINK_ADMIN_ADDR`. The admin surface is
//! deliberately unauthenticated demo wiring; it only exercises the
//! boundary contract of the core.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetlink_proto::timing;
use fleetlink_server::{
    AgentRecord, AgentStorage, CommandOutcome, ControlServer, MemoryStorage, ServerConfig,
    StorageError,
};

type SharedServer = Arc<ControlServer<MemoryStorage>>;

#[derive(Deserialize)]
struct CommandBody {
    command: String,
}

#[derive(Deserialize)]
struct NameBody {
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let agent_addr =
        std::env::var("FLEETLINK_AGENT_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let admin_addr =
        std::env::var("FLEETLINK_ADMIN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let config = ServerConfig::default();
    config.validate(timing::HEARTBEAT_INTERVAL)?;

    let server: SharedServer = Arc::new(ControlServer::new(MemoryStorage::new(), config));
    let bound = server.start(&agent_addr).await?;
    tracing::info!(%bound, "agent listener up");

    let app = Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/{agent_id}", get(get_agent))
        .route("/agents/{agent_id}/name", post(rename_agent))
        .route("/agents/{agent_id}/command", post(run_command))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&server));

    tracing::info!(%admin_addr, "admin API listening");
    let listener = tokio::net::TcpListener::bind(&admin_addr).await?;
    axum::serve(listener, app).await?;

    server.stop().await?;
    Ok(())
}

async fn list_agents(
    State(server): State<SharedServer>,
) -> Result<Json<Vec<AgentRecord>>, StatusCode> {
    server
        .storage()
        .list()
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn get_agent(
    State(server): State<SharedServer>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecord>, StatusCode> {
    match server.storage().get(&agent_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn rename_agent(
    State(server): State<SharedServer>,
    Path(agent_id): Path<String>,
    Json(body): Json<NameBody>,
) -> Result<StatusCode, StatusCode> {
    match server.storage().rename(&agent_id, &body.name).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StorageError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn run_command(
    State(server): State<SharedServer>,
    Path(agent_id): Path<String>,
    Json(body): Json<CommandBody>,
) -> Json<CommandOutcome> {
    Json(server.dispatcher().run_command(&agent_id, &body.command).await)
}
