//! Oh My Chess demo
//!
//! Two players, one backend. Each player runs its own synchronization
//! hook, exactly as two browser tabs would.
//!
//! With `OH_MY_CHESS_RPC_URL` set the game goes through the contract
//! gateway at that URL; otherwise it runs against an in-process backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use oh_my_chess::{
    network::backend::{BackendConnector, ClientConfig, WsConnector},
    network::memory::MemoryConnector,
    ChessLocation, GameSync, Player, SessionId, SyncConfig, VERSION,
};

const MEMORY_NETWORK: &str = "mem://demo";
const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
const BOB: &str = "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Oh My Chess client v{}", VERSION);

    let (connector, network) = select_backend();
    let network = network.as_str();
    let config = SyncConfig {
        poll_interval: Duration::from_millis(250),
        ..SyncConfig::default()
    };
    let alice = GameSync::new(connector.clone(), config.clone());
    let bob = GameSync::new(connector, config);

    alice.set_identity(network, Some(ALICE)).await?;
    bob.set_identity(network, Some(BOB)).await?;

    let id = alice.create_session(Some(Player::White), None).await?;
    info!("Alice opened session {}", id);
    bob.join_session(&id).await?;

    alice.select_session(Some(id.clone())).await;
    bob.select_session(Some(id.clone())).await;

    // fool's mate
    let moves = [
        (&alice, "f2", "f3"),
        (&bob, "e7", "e5"),
        (&alice, "g2", "g4"),
        (&bob, "d8", "h4"),
    ];
    for (player, from, to) in moves {
        player
            .submit_move(&id, ChessLocation::from_square(from)?, ChessLocation::from_square(to)?)
            .await?;
        info!("{} -> {}", from, to);
        log_view(player, &id).await?;
    }

    // let Bob's poller pick up the final position
    tokio::time::sleep(Duration::from_millis(300)).await;
    for (name, player) in [("Alice", &alice), ("Bob", &bob)] {
        let view = player.session_view().await.context("no snapshot yet")?;
        info!("{}: {}", name, view.status_message);
    }

    Ok(())
}

fn select_backend() -> (Arc<dyn BackendConnector>, String) {
    if std::env::var("OH_MY_CHESS_RPC_URL").is_ok() {
        let config = ClientConfig::from_env();
        info!("Using contract gateway at {}", config.network_url);
        let network = config.network_url.clone();
        let connector: Arc<dyn BackendConnector> = Arc::new(WsConnector::new(config));
        (connector, network)
    } else {
        info!("OH_MY_CHESS_RPC_URL not set, using in-process backend");
        let connector: Arc<dyn BackendConnector> = MemoryConnector::new();
        (connector, MEMORY_NETWORK.to_string())
    }
}

async fn log_view(player: &GameSync, id: &SessionId) -> Result<()> {
    let Some(view) = player.session_view().await else {
        bail!("no snapshot of {id}");
    };
    info!("  {}", view.notation);
    info!("  {}", view.status_message);
    Ok(())
}
