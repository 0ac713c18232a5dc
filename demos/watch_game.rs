//! # Watch Game Example
//!
//! Mounts one Word Duel game view and prints every status change:
//!
//! 1. Open the push channel and fetch the current state
//! 2. Serve the offline snapshot (marked stale) while the network is down
//! 3. Fall back to polling whenever push is unavailable
//! 4. Unmount cleanly on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! WORD_DUEL_API=https://api.example.com/v1 \
//! WORD_DUEL_PUSH=wss://push.example.com/prod \
//! WORD_DUEL_GAME=g-42 WORD_DUEL_PLAYER=p1 \
//! cargo run --example watch_game
//!
//! # Leave WORD_DUEL_PUSH unset to watch by polling alone.
//! ```

use word_duel_sync::api::HttpGameApi;
use word_duel_sync::{
    FileStore, GameSync, HostSignals, Participant, SyncConfig, SyncStatus, WebSocketConnector,
};

/// Default API base when `WORD_DUEL_API` is not set.
const DEFAULT_API: &str = "http://localhost:3000/api";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn render(status: &SyncStatus, player_id: &str) {
    let Some(synced) = &status.view else {
        match &status.error {
            Some(error) => tracing::warn!("No game state yet: {error}"),
            None => tracing::info!("Waiting for game state…"),
        }
        return;
    };
    let view = &synced.view;
    let opponent = view
        .opponent(player_id)
        .map_or("(nobody yet)", |p| p.name.as_str());
    tracing::info!(
        "{} vs {opponent}: {:?}, {} guess(es), my turn: {}{}",
        view.player1.name,
        view.phase,
        view.guesses.len(),
        view.my_turn,
        if status.is_stale() { " [offline copy]" } else { "" },
    );
    if let Some(error) = &status.error {
        tracing::warn!("Last refresh failed: {error}");
    }
    tracing::debug!(
        "push: {}, polling: {}",
        status.connection,
        status.polling
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=word_duel_sync=debug` to see sync decisions.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let api_base = env_or("WORD_DUEL_API", DEFAULT_API);
    let game_id = env_or("WORD_DUEL_GAME", "demo-game");
    let player_id = env_or("WORD_DUEL_PLAYER", "demo-player");
    let player_name = env_or("WORD_DUEL_NAME", "RustPlayer");

    let mut config = SyncConfig::new();
    if let Ok(push) = std::env::var("WORD_DUEL_PUSH") {
        config = config.with_push_endpoint(push);
    }
    tracing::info!("Watching game {game_id} via {api_base}");

    // ── Mount ───────────────────────────────────────────────────────
    let api = HttpGameApi::new(&api_base)?;
    if let Ok(token) = std::env::var("WORD_DUEL_TOKEN") {
        api.set_token(Some(token));
    }
    let (mut sync, mut status) = GameSync::mount(
        api,
        WebSocketConnector::new(),
        FileStore::in_default_location()?,
        config,
        HostSignals::new(),
        Participant::new(game_id, player_id.clone(), player_name),
    )?;
    render(&status.borrow_and_update(), &player_id);

    // ── Status loop ─────────────────────────────────────────────────
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    tracing::info!("Status channel closed, exiting");
                    break;
                }
                let current = status.borrow_and_update().clone();
                render(&current, &player_id);
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, unmounting…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    sync.unmount();
    tracing::info!("Game view unmounted. Goodbye!");
    Ok(())
}
