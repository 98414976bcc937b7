//! Café Manager Game Server
//!
//! Serves the café game over WebSocket. Configuration comes from the
//! environment; see `ServerConfig::from_env` and `AuthConfig::from_env`.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cafe_manager::{
    network::{AuthConfig, GameServer, ServerConfig},
    ScoreStore, RulesConfig, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("reading server configuration")?;
    let auth = AuthConfig::from_env();
    let rules = RulesConfig::default();

    info!("Café Manager Server v{}", VERSION);
    info!(
        "Rules: {} s per order, {} lives, {} points per serve, level up every {} serves",
        rules.round_seconds, rules.starting_lives, rules.points_per_serve, rules.serves_per_level
    );
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; every player is a guest");
    }

    let store = match &config.store_path {
        Some(path) => ScoreStore::open(path)
            .await
            .with_context(|| format!("opening score store {}", path.display()))?,
        None => {
            info!("CAFE_STORE_PATH not set, scores are kept in memory");
            ScoreStore::in_memory()
        }
    };

    let server = Arc::new(GameServer::new(config, auth, rules, Arc::new(store)));

    let running = server.clone();
    let mut handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut handle => {
            result.context("server task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
            handle.await.context("server task panicked")??;
        }
    }

    Ok(())
}
