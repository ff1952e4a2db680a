//! Skirmish Arena Server
//!
//! Authoritative real-time server binary: loads configuration, wires the
//! production adapters (JWT auth, in-memory repository/store until a real
//! database is fronted), and runs the WebSocket game server until asked to
//! shut down.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use skirmish_arena::config::AppConfig;
use skirmish_arena::network::auth::{AuthConfig, JwtAuthProvider};
use skirmish_arena::network::server::GameServer;
use skirmish_arena::repository::{InMemoryRepository, OutboxWriter};
use skirmish_arena::store::InMemoryStore;
use skirmish_arena::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        version = VERSION,
        game_port = config.game_port,
        tick_hz = config.tick_hz,
        "starting skirmish arena server"
    );

    let mut auth_config = AuthConfig::from_env();
    if auth_config.secret.is_none() {
        auth_config.secret = config.token_secret.clone();
    }
    let auth = Arc::new(JwtAuthProvider::new(auth_config));

    let repository = Arc::new(InMemoryRepository::new(Vec::new()));
    let store = Arc::new(InMemoryStore::new());
    let outbox = Arc::new(OutboxWriter::new(std::env::temp_dir().join("skirmish-arena-outbox.jsonl")));

    let server = GameServer::new(config.clone(), auth, repository, store, outbox);
    let handle = server.clone().spawn().await?;

    let sweeper = {
        let server = server.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                server.sweep_stale_sessions().await;
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to wait on ctrl-c, shutting down anyway");
    } else {
        tracing::info!("shutdown signal received");
    }

    sweeper.abort();
    handle.shutdown(Duration::from_secs(config.drain_grace_sec)).await;
    tracing::info!("server stopped");
    Ok(())
}
