//! Memo Game Server
//!
//! Loads the token metadata cache, deals a board and serves it over
//! WebSocket until interrupted.

use anyhow::Context;
use rand::rngs::OsRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use memo::{Board, Collection, GameServer, GameSession, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memo=info")))
        .init();

    info!("Memo Server v{}", VERSION);

    let config = ServerConfig::from_env();
    info!("Loading token metadata from {}", config.data_dir.display());
    let collection = Collection::load_dir(&config.data_dir)
        .with_context(|| format!("loading collection from {}", config.data_dir.display()))?;
    info!("Loaded {} tokens", collection.len());

    let board = Board::generate(&collection, config.game.rows, config.game.cols, &mut OsRng)
        .context("dealing the board")?;
    let bases = board.engine().bases();
    info!("Public bases: G1={} G2={}", bases.g1.to_hex(), bases.g2.to_hex());

    let game = GameSession::new(board, config.game.clone(), config.outbound_buffer);
    let server = GameServer::new(config, game);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown.send(());
            }
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await.context("game server failed")?;

    let settlements = server.game().settlements();
    info!("Shutting down after {} proven matches", settlements.len());
    Ok(())
}
