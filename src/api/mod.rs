//! Request/response API seam.
//!
//! [`GameApi`] is the pull side of synchronization: it creates and joins
//! games, submits guesses, and fetches the authoritative [`GameView`] when
//! the push channel cannot be trusted. The sync layer only ever talks to the
//! trait, so tests can substitute a scripted implementation.
//!
//! With the `http-api` feature, [`HttpGameApi`] implements the trait over
//! HTTP with `reqwest`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::error_kind::ApiErrorKind;
use crate::protocol::{GameId, GameView, Guess, PlayerId};

#[cfg(feature = "http-api")]
pub mod http;

#[cfg(feature = "http-api")]
pub use http::HttpGameApi;

// ── Errors ──────────────────────────────────────────────────────────

/// A structured failure reported by (or on the way to) the API.
///
/// Deserializes directly from the backend's `{"kind", "message"}` error body.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The request never got a response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Result of an API call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Request and response bodies ─────────────────────────────────────

/// Body of `create_game`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameParams {
    pub player_id: PlayerId,
    pub player_name: String,
    /// The word the opponent has to guess.
    pub secret_word: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGame {
    pub game_id: GameId,
}

/// Body of `join_game`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameParams {
    pub player_id: PlayerId,
    pub player_name: String,
    pub secret_word: String,
}

/// A game waiting for a second player, as listed in the lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: GameId,
    pub player1_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated session returned by `register` and `login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub player_id: PlayerId,
    pub username: String,
}

/// Lifetime results of a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    /// Mean guesses per won game, when the player has won at least once.
    #[serde(default)]
    pub average_guesses: Option<f64>,
}

/// Outcome of a conditional state fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The state changed (or no version token was sent).
    Modified {
        view: GameView,
        /// Version token to send with the next fetch.
        etag: Option<String>,
    },
    /// The state is unchanged since the version token that was sent.
    NotModified,
}

// ── Trait ───────────────────────────────────────────────────────────

/// The request/response surface of the game backend.
#[async_trait]
pub trait GameApi: Send + Sync + 'static {
    /// Create a game and take the first seat.
    async fn create_game(&self, params: CreateGameParams) -> ApiResult<CreatedGame>;

    /// Take the second seat. Returns the resulting state.
    async fn join_game(&self, game_id: &str, params: JoinGameParams) -> ApiResult<GameView>;

    /// Submit a guess for `player_id`.
    async fn submit_guess(&self, game_id: &str, player_id: &str, word: &str) -> ApiResult<Guess>;

    /// Fetch the current state as seen by `player_id`.
    ///
    /// When `if_none_match` carries the version token of a previous fetch and
    /// the state has not changed, returns [`FetchOutcome::NotModified`].
    async fn fetch_game(
        &self,
        game_id: &str,
        player_id: &str,
        if_none_match: Option<&str>,
    ) -> ApiResult<FetchOutcome>;

    /// Games waiting for a second player.
    async fn list_open_games(&self) -> ApiResult<Vec<GameSummary>>;

    async fn register(&self, credentials: Credentials) -> ApiResult<AuthSession>;

    async fn login(&self, credentials: Credentials) -> ApiResult<AuthSession>;

    async fn fetch_stats(&self, player_id: &str) -> ApiResult<PlayerStats>;
}
