//! RSPS Game Server
//!
//! Opens the player database, starts the game loop, and serves WebSocket
//! clients until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rsps::network::Dispatcher;
use rsps::{
    EngineConfig, GameEngine, GameServer, PlayerStore, ServerConfig, SessionRegistry, SqliteStore,
    TICK_RATE_MS, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("RSPS Server v{}", VERSION);

    let server_config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    info!(
        "Tick period: {}ms (default {}ms)",
        engine_config.tick_period.as_millis(),
        TICK_RATE_MS
    );

    let store: Arc<dyn PlayerStore> = Arc::new(
        SqliteStore::open(&server_config.db_path)
            .with_context(|| format!("failed to open player database at {}", server_config.db_path))?,
    );
    info!("Player database: {}", server_config.db_path);

    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), store.clone()));
    let engine = Arc::new(GameEngine::new(engine_config, registry, store));
    let server = Arc::new(GameServer::new(server_config, dispatcher));

    engine.start();

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Ctrl-C received, shutting down");
        }
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("Server stopped"),
                Ok(Err(e)) => error!("Server failed: {}", e),
                Err(e) => error!("Server task failed: {}", e),
            }
        }
    }

    server.shutdown();
    engine.stop();
    engine.save_all().await;

    info!("Goodbye");
    Ok(())
}
