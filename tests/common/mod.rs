#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Word Duel sync integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands out
//! one scripted transport per connection attempt, a [`MockApi`] for the
//! request/response side, and helpers for building game views and push
//! envelopes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::time::Instant;
use word_duel_sync::api::{
    ApiError, ApiErrorKind, ApiResult, AuthSession, CreateGameParams, CreatedGame, Credentials,
    FetchOutcome, GameApi, GameSummary, JoinGameParams, PlayerStats,
};
use word_duel_sync::protocol::{GamePhase, GameView, Guess, PlayerSlot};
use word_duel_sync::{Connector, SyncError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted inbound items for one transport. `None` closes the channel.
pub type Script = Vec<Option<Result<String, SyncError>>>;

/// A scripted mock transport.
///
/// Scripted server messages are consumed in order by `recv()`. When the
/// script runs out, `recv()` hangs so the channel stays open until shutdown.
/// Sent messages and closes are recorded in the shared [`ConnectLog`].
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, SyncError>>>,
    log: ConnectLog,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.log.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// What one connection attempt does.
pub enum Attempt {
    /// Open a transport that plays `Script`.
    Open(Script),
    /// Fail the attempt.
    Refuse,
}

/// Shared record of everything the connector and its transports did.
#[derive(Clone, Default)]
pub struct ConnectLog {
    attempts: Arc<StdMutex<Vec<(Instant, String)>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl ConnectLog {
    pub fn count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, uri)| uri.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A connector that plays one [`Attempt`] per `connect` call and refuses
/// once the script is exhausted.
pub struct MockConnector {
    attempts: StdMutex<VecDeque<Attempt>>,
    log: ConnectLog,
}

impl MockConnector {
    pub fn new(attempts: Vec<Attempt>) -> (Self, ConnectLog) {
        let log = ConnectLog::default();
        let connector = Self {
            attempts: StdMutex::new(attempts.into()),
            log: log.clone(),
        };
        (connector, log)
    }

    /// A connector that refuses every attempt.
    pub fn refusing() -> (Self, ConnectLog) {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, uri: &str) -> Result<MockTransport, SyncError> {
        self.log
            .attempts
            .lock()
            .unwrap()
            .push((Instant::now(), uri.to_owned()));
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Open(script)) => Ok(MockTransport {
                incoming: script.into(),
                log: self.log.clone(),
            }),
            Some(Attempt::Refuse) | None => Err(SyncError::Connect("connection refused".into())),
        }
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

/// One recorded API call.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub at: Instant,
    pub op: &'static str,
    /// Version token sent with `fetch_game`.
    pub etag: Option<String>,
}

#[derive(Default)]
struct ApiState {
    fetches: StdMutex<VecDeque<ApiResult<FetchOutcome>>>,
    fallback: StdMutex<Option<ApiResult<FetchOutcome>>>,
    join: StdMutex<Option<GameView>>,
    calls: StdMutex<Vec<ApiCall>>,
}

/// Test-side handle for scripting and inspecting a [`MockApi`].
#[derive(Clone)]
pub struct ApiScript {
    state: Arc<ApiState>,
}

impl ApiScript {
    /// Queue one `fetch_game` result.
    pub fn push_fetch(&self, result: ApiResult<FetchOutcome>) {
        self.state.fetches.lock().unwrap().push_back(result);
    }

    /// Result returned by `fetch_game` once the queue is empty.
    pub fn set_fallback(&self, result: ApiResult<FetchOutcome>) {
        *self.state.fallback.lock().unwrap() = Some(result);
    }

    /// View returned by `join_game`.
    pub fn set_join_view(&self, view: GameView) {
        *self.state.join.lock().unwrap() = Some(view);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == "fetch_game")
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches().len()
    }

    /// Gaps between consecutive fetches.
    pub fn fetch_gaps(&self) -> Vec<std::time::Duration> {
        self.fetches()
            .windows(2)
            .map(|pair| pair[1].at - pair[0].at)
            .collect()
    }
}

/// A scripted [`GameApi`].
pub struct MockApi {
    state: Arc<ApiState>,
}

impl MockApi {
    /// An API whose fetches return `active_view(1, true)` until scripted
    /// otherwise.
    pub fn new() -> (Self, ApiScript) {
        let state = Arc::new(ApiState::default());
        let script = ApiScript {
            state: Arc::clone(&state),
        };
        script.set_fallback(Ok(modified(active_view(1, true))));
        (Self { state }, script)
    }

    fn record(&self, op: &'static str, etag: Option<&str>) {
        self.state.calls.lock().unwrap().push(ApiCall {
            at: Instant::now(),
            op,
            etag: etag.map(str::to_owned),
        });
    }
}

#[async_trait]
impl GameApi for MockApi {
    async fn create_game(&self, _params: CreateGameParams) -> ApiResult<CreatedGame> {
        self.record("create_game", None);
        Ok(CreatedGame {
            game_id: "g1".into(),
        })
    }

    async fn join_game(&self, game_id: &str, params: JoinGameParams) -> ApiResult<GameView> {
        self.record("join_game", None);
        let scripted = self.state.join.lock().unwrap().clone();
        Ok(scripted.unwrap_or_else(|| {
            let mut view = active_view(1, false);
            view.game_id = game_id.to_owned();
            view.player2 = Some(PlayerSlot {
                id: params.player_id,
                name: params.player_name,
                completed: false,
            });
            view
        }))
    }

    async fn submit_guess(&self, game_id: &str, player_id: &str, word: &str) -> ApiResult<Guess> {
        self.record("submit_guess", None);
        Ok(Guess {
            game_id: game_id.to_owned(),
            player_id: player_id.to_owned(),
            word: word.to_owned(),
            matches: 2,
            is_win: false,
            timestamp: chrono::Utc::now(),
        })
    }

    async fn fetch_game(
        &self,
        _game_id: &str,
        _player_id: &str,
        if_none_match: Option<&str>,
    ) -> ApiResult<FetchOutcome> {
        self.record("fetch_game", if_none_match);
        let queued = self.state.fetches.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => self
                .state
                .fallback
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(network_error())),
        }
    }

    async fn list_open_games(&self) -> ApiResult<Vec<GameSummary>> {
        self.record("list_open_games", None);
        Ok(Vec::new())
    }

    async fn register(&self, credentials: Credentials) -> ApiResult<AuthSession> {
        self.record("register", None);
        Ok(session(&credentials.username))
    }

    async fn login(&self, credentials: Credentials) -> ApiResult<AuthSession> {
        self.record("login", None);
        Ok(session(&credentials.username))
    }

    async fn fetch_stats(&self, player_id: &str) -> ApiResult<PlayerStats> {
        self.record("fetch_stats", None);
        Ok(PlayerStats {
            player_id: player_id.to_owned(),
            games_played: 0,
            wins: 0,
            losses: 0,
            average_guesses: None,
        })
    }
}

fn session(username: &str) -> AuthSession {
    AuthSession {
        token: "token".into(),
        player_id: "p1".into(),
        username: username.to_owned(),
    }
}

// ── Builders ────────────────────────────────────────────────────────

fn slot(id: &str, name: &str) -> PlayerSlot {
    PlayerSlot {
        id: id.into(),
        name: name.into(),
        completed: false,
    }
}

/// An active game between p1 (Ada) and p2 (Grace), as seen by p1.
pub fn active_view(version: u64, my_turn: bool) -> GameView {
    GameView {
        game_id: "g1".into(),
        phase: GamePhase::Active,
        player1: slot("p1", "Ada"),
        player2: Some(slot("p2", "Grace")),
        current_turn: Some(if my_turn { "p1" } else { "p2" }.into()),
        guesses: vec![],
        winner: None,
        my_turn,
        version: Some(version),
        updated_at: None,
    }
}

/// A finished game won by p2.
pub fn completed_view(version: u64) -> GameView {
    GameView {
        phase: GamePhase::Completed,
        current_turn: None,
        winner: Some("p2".into()),
        my_turn: false,
        ..active_view(version, false)
    }
}

pub fn modified(view: GameView) -> FetchOutcome {
    FetchOutcome::Modified { view, etag: None }
}

pub fn modified_with_etag(view: GameView, etag: &str) -> FetchOutcome {
    FetchOutcome::Modified {
        view,
        etag: Some(etag.to_owned()),
    }
}

pub fn network_error() -> ApiError {
    ApiError::new(ApiErrorKind::Network, "connection refused")
}

// ── Push envelopes ──────────────────────────────────────────────────

/// A `GAME_STATE` envelope carrying `view`.
pub fn game_state_json(view: &GameView) -> String {
    serde_json::json!({
        "type": "GAME_STATE",
        "payload": view,
        "timestamp": 1_760_000_000_000_i64,
    })
    .to_string()
}

pub fn player_joined_json() -> String {
    r#"{"type":"PLAYER_JOINED","payload":{"playerId":"p2","playerName":"Grace"},"timestamp":1760000000000}"#
        .to_owned()
}

pub fn game_completed_json() -> String {
    r#"{"type":"GAME_COMPLETED","payload":{"winner":"p2"},"timestamp":1760000000000}"#.to_owned()
}

pub fn pong_json() -> String {
    r#"{"type":"PONG","timestamp":1760000000000}"#.to_owned()
}

/// Scripted message helper.
pub fn text(json: String) -> Option<Result<String, SyncError>> {
    Some(Ok(json))
}
