//! Game view synchronization.
//!
//! [`GameSync`] ties the pieces together for one mounted game view: a
//! [`ConnectionManager`] for the push channel, a [`Reconciler`] that folds
//! push messages into the [`StateCache`], and a [`PollSchedule`] that pulls
//! state through the [`GameApi`] whenever push is unavailable.
//!
//! All writes to the cache happen on a single background actor task. The UI
//! observes the result through a [`watch::Receiver<SyncStatus>`].
//!
//! ```rust,ignore
//! let (mut sync, mut status) = GameSync::mount(
//!     HttpGameApi::new("https://api.example.com/v1")?,
//!     WebSocketConnector::new(),
//!     FileStore::in_default_location()?,
//!     SyncConfig::new().with_push_endpoint("wss://push.example.com/prod"),
//!     HostSignals::new(),
//!     Participant::new("g1", "p1", "Ada"),
//! )?;
//!
//! while status.changed().await.is_ok() {
//!     let current = status.borrow_and_update().clone();
//!     render(&current);
//! }
//! sync.unmount();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiError, FetchOutcome, GameApi, JoinGameParams};
use crate::cache::{StateCache, SyncedView};
use crate::config::SyncConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::error::{Result, SyncError};
use crate::poll::{base_interval, PollSchedule};
use crate::protocol::{GameId, GameView, Guess, PlayerId};
use crate::reconcile::{Reconciler, Reconciliation};
use crate::store::OfflineStore;
use crate::transport::Connector;

// ── Host signals ────────────────────────────────────────────────────

/// Visibility and connectivity of the host environment.
///
/// Clones share state: keep one clone in the UI layer and flip it with
/// [`set_visible`](Self::set_visible) and [`set_online`](Self::set_online).
/// Both start `true`.
#[derive(Debug, Clone)]
pub struct HostSignals {
    visible: Arc<watch::Sender<bool>>,
    online: Arc<watch::Sender<bool>>,
}

impl HostSignals {
    pub fn new() -> Self {
        Self {
            visible: Arc::new(watch::Sender::new(true)),
            online: Arc::new(watch::Sender::new(true)),
        }
    }

    /// Report whether the game view is on screen.
    pub fn set_visible(&self, visible: bool) {
        self.visible.send_replace(visible);
    }

    /// Report whether the network is reachable.
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }
}

impl Default for HostSignals {
    fn default() -> Self {
        Self::new()
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// Who is looking at which game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub game_id: GameId,
    pub player_id: PlayerId,
    /// Display name sent when opening the push channel.
    pub player_name: String,
}

impl Participant {
    pub fn new(
        game_id: impl Into<GameId>,
        player_id: impl Into<PlayerId>,
        player_name: impl Into<String>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            player_id: player_id.into(),
            player_name: player_name.into(),
        }
    }
}

/// Everything the UI needs to render one game view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// Best known view, labelled with where it came from.
    pub view: Option<SyncedView>,
    /// Push channel state.
    pub connection: ConnectionState,
    /// The most recent fetch failure, cleared by the next successful fetch.
    pub error: Option<ApiError>,
    /// Whether the fallback poller is currently running.
    pub polling: bool,
}

impl SyncStatus {
    /// The displayed view is a durable snapshot and may be stale.
    pub fn is_stale(&self) -> bool {
        self.view.as_ref().is_some_and(SyncedView::is_cached)
    }
}

// ── Handle ──────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    /// Pull the current state. `forced` skips the version token.
    Refresh { forced: bool },
    /// Store a view obtained outside the actor.
    Adopt(Box<GameView>),
}

/// A mounted game view.
///
/// Dropping the handle unmounts it.
pub struct GameSync<A: GameApi, C: Connector> {
    api: Arc<A>,
    connection: ConnectionManager<C>,
    participant: Arc<Participant>,
    push_endpoint: Option<String>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    unmounted: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl<A: GameApi, C: Connector> GameSync<A, C> {
    /// Mount a game view.
    ///
    /// Serves the durable snapshot (labelled cached) right away if one exists,
    /// fetches the current state, and opens the push channel when
    /// [`SyncConfig::push_endpoint`] is set. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEndpoint`] if the push endpoint is not a
    /// `ws://` or `wss://` URL.
    pub fn mount(
        api: A,
        connector: C,
        store: impl OfflineStore,
        config: SyncConfig,
        signals: HostSignals,
        participant: Participant,
    ) -> Result<(Self, watch::Receiver<SyncStatus>)> {
        let participant = Arc::new(participant);
        let mut cache = StateCache::new(store, config.cache_horizon);
        cache.sweep();

        let (mut connection, events) = ConnectionManager::new(connector, config.clone());
        let push_endpoint = config.push_endpoint.clone();
        if let Some(endpoint) = &push_endpoint {
            connection.connect(
                endpoint,
                &participant.game_id,
                &participant.player_id,
                &participant.player_name,
            )?;
        }

        let initial = SyncStatus {
            view: cache.load_snapshot(&participant.game_id),
            connection: connection.state(),
            error: None,
            polling: false,
        };
        if initial.view.is_some() {
            debug!(game_id = %participant.game_id, "serving offline snapshot until the first fetch");
        }
        let (status_tx, status_rx) = watch::channel(initial);
        let status_tx = Arc::new(status_tx);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let unmounted = Arc::new(AtomicBool::new(false));
        let api = Arc::new(api);

        let actor = Actor {
            api: Arc::clone(&api),
            participant: Arc::clone(&participant),
            push_enabled: push_endpoint.is_some(),
            reconciler: Reconciler::new(participant.game_id.clone()),
            schedule: PollSchedule::from_config(&config),
            fetch_timeout: config.fetch_timeout,
            cache,
            etag: None,
            connection: connection.state(),
            has_connected: false,
            link_lost: false,
            visible: signals.is_visible(),
            online: signals.is_online(),
            last_error: None,
            next_poll: None,
            status_tx: Arc::clone(&status_tx),
            unmounted: Arc::clone(&unmounted),
        };
        let inputs = ActorInputs {
            events,
            state_rx: connection.watch_state(),
            cmd_rx,
            signals,
        };
        let task = tokio::spawn(actor.run(inputs));
        info!(game_id = %participant.game_id, push = push_endpoint.is_some(), "game view mounted");

        let sync = Self {
            api,
            connection,
            participant,
            push_endpoint,
            cmd_tx,
            status_tx,
            unmounted,
            task: Some(task),
        };
        Ok((sync, status_rx))
    }

    /// Queue one immediate fetch. Requests queued before the fetch runs are
    /// served by that single fetch.
    pub fn refresh(&self) {
        self.command(Command::Refresh { forced: false });
    }

    /// Manual recovery after the push channel has `Failed`: open it again
    /// and fetch the current state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Unmounted`] after [`unmount`](Self::unmount), or
    /// [`SyncError::InvalidEndpoint`] if the push endpoint is invalid.
    pub fn reconnect(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        if let Some(endpoint) = &self.push_endpoint {
            info!(game_id = %self.participant.game_id, "manual reconnect requested");
            self.connection.connect(
                endpoint,
                &self.participant.game_id,
                &self.participant.player_id,
                &self.participant.player_name,
            )?;
        }
        self.refresh();
        Ok(())
    }

    /// Submit a guess. Goes straight to the API regardless of the push
    /// channel state, then queues a refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the backend rejects the guess or cannot
    /// be reached, or [`SyncError::Unmounted`] after unmount.
    pub async fn submit_guess(&self, word: &str) -> Result<Guess> {
        self.ensure_mounted()?;
        let guess = self
            .api
            .submit_guess(&self.participant.game_id, &self.participant.player_id, word)
            .await?;
        debug!(game_id = %self.participant.game_id, matches = guess.matches, "guess accepted");
        self.refresh();
        Ok(guess)
    }

    /// Take the second seat in the mounted game.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the backend refuses the join, or
    /// [`SyncError::Unmounted`] after unmount.
    pub async fn join(&self, player_name: &str, secret_word: &str) -> Result<GameView> {
        self.ensure_mounted()?;
        let params = JoinGameParams {
            player_id: self.participant.player_id.clone(),
            player_name: player_name.to_owned(),
            secret_word: secret_word.to_owned(),
        };
        let view = self
            .api
            .join_game(&self.participant.game_id, params)
            .await?;
        self.command(Command::Adopt(Box::new(view.clone())));
        self.refresh();
        Ok(view)
    }

    /// Tear the view down: close the push channel, cancel any pending
    /// reconnect, and stop the poller. No API or connector call is made
    /// afterwards. Calling it again is a no-op.
    pub fn unmount(&mut self) {
        if self.unmounted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connection.disconnect();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.status_tx.send_modify(|status| {
            status.connection = ConnectionState::Disconnected;
            status.polling = false;
        });
        info!(game_id = %self.participant.game_id, "game view unmounted");
    }

    /// The latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// A new receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// The API client, for calls outside the mounted game (lobby, stats).
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_mounted(&self) -> bool {
        !self.unmounted.load(Ordering::Acquire)
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(SyncError::Unmounted)
        }
    }

    fn command(&self, command: Command) {
        if !self.is_mounted() {
            debug!("game view unmounted; dropping command");
            return;
        }
        if self.cmd_tx.send(command).is_err() {
            debug!("sync actor gone; dropping command");
        }
    }
}

impl<A: GameApi, C: Connector> fmt::Debug for GameSync<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSync")
            .field("game_id", &self.participant.game_id)
            .field("connection", &self.connection.state())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

impl<A: GameApi, C: Connector> Drop for GameSync<A, C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

// ── Actor ───────────────────────────────────────────────────────────

struct ActorInputs {
    events: mpsc::Receiver<ConnectionEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    signals: HostSignals,
}

/// Sole writer of the state cache for one mounted view.
struct Actor<A: GameApi> {
    api: Arc<A>,
    participant: Arc<Participant>,
    push_enabled: bool,
    reconciler: Reconciler,
    schedule: PollSchedule,
    fetch_timeout: std::time::Duration,
    cache: StateCache,
    /// Version token of the last accepted fetch.
    etag: Option<String>,
    connection: ConnectionState,
    has_connected: bool,
    /// Set once push is lost (`Reconnecting` or `Failed`) and held through
    /// the `Connecting`/`Disconnected` steps of a retry until `Connected`.
    link_lost: bool,
    visible: bool,
    online: bool,
    last_error: Option<ApiError>,
    next_poll: Option<Instant>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    unmounted: Arc<AtomicBool>,
}

impl<A: GameApi> Actor<A> {
    async fn run(mut self, inputs: ActorInputs) {
        let ActorInputs {
            mut events,
            mut state_rx,
            mut cmd_rx,
            signals,
        } = inputs;
        let mut visible_rx = signals.visible.subscribe();
        let mut online_rx = signals.online.subscribe();

        self.connection = *state_rx.borrow_and_update();
        self.has_connected = self.connection == ConnectionState::Connected;
        self.link_lost = matches!(
            self.connection,
            ConnectionState::Reconnecting | ConnectionState::Failed
        );
        self.fetch(false).await;

        loop {
            let deadline = self.next_poll;
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("command channel closed; sync actor exiting");
                        return;
                    };
                    self.on_commands(cmd, &mut cmd_rx).await;
                }

                Some(event) = events.recv() => {
                    self.on_event(event);
                    while let Ok(event) = events.try_recv() {
                        self.on_event(event);
                    }
                    if self.reconciler.take_refresh() {
                        self.fetch(false).await;
                    } else {
                        self.publish();
                    }
                }

                Ok(()) = state_rx.changed() => {
                    let state = *state_rx.borrow_and_update();
                    self.on_connection_state(state).await;
                }

                Ok(()) = visible_rx.changed() => {
                    let visible = *visible_rx.borrow_and_update();
                    self.on_visibility(visible).await;
                }

                Ok(()) = online_rx.changed() => {
                    let online = *online_rx.borrow_and_update();
                    self.on_connectivity(online).await;
                }

                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.next_poll = None;
                    debug!(game_id = %self.participant.game_id, "poll deadline reached");
                    self.fetch(false).await;
                }
            }
        }
    }

    async fn on_commands(&mut self, first: Command, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) {
        let mut refresh: Option<bool> = None;
        let mut next = Some(first);
        while let Some(cmd) = next.take().or_else(|| cmd_rx.try_recv().ok()) {
            match cmd {
                Command::Refresh { forced } => {
                    refresh = Some(refresh.unwrap_or(false) || forced);
                }
                Command::Adopt(view) => {
                    self.store_view(*view, None);
                }
            }
        }

        match refresh {
            Some(forced) => self.fetch(forced).await,
            None => {
                self.reschedule();
                self.publish();
            }
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(msg) => {
                match self.reconciler.apply(&mut self.cache, msg) {
                    Reconciliation::Replaced(view) => {
                        debug!(
                            game_id = %self.participant.game_id,
                            my_turn = view.my_turn,
                            "game state replaced from push"
                        );
                        self.reschedule();
                    }
                    Reconciliation::Stale
                    | Reconciliation::RefreshRequired
                    | Reconciliation::Ignored => {}
                }
            }
            ConnectionEvent::TransportError(e) => {
                debug!(game_id = %self.participant.game_id, "push transport error: {e}");
            }
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                debug!(game_id = %self.participant.game_id, attempt, ?delay, "push reconnect scheduled");
            }
            ConnectionEvent::SendDropped(_) | ConnectionEvent::StateChanged(_) => {}
        }
    }

    async fn on_connection_state(&mut self, state: ConnectionState) {
        let previous = std::mem::replace(&mut self.connection, state);
        if previous == state {
            return;
        }
        debug!(game_id = %self.participant.game_id, from = %previous, to = %state, "push state observed");
        match state {
            ConnectionState::Connected => self.link_lost = false,
            ConnectionState::Reconnecting | ConnectionState::Failed => self.link_lost = true,
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }

        if state == ConnectionState::Connected {
            let catch_up = self.has_connected;
            self.has_connected = true;
            if catch_up {
                // Push messages sent while the channel was down are lost.
                self.fetch(false).await;
                return;
            }
        }
        self.ensure_scheduled();
        self.publish();
    }

    async fn on_visibility(&mut self, visible: bool) {
        let was = std::mem::replace(&mut self.visible, visible);
        if visible && !was && self.push_unavailable() {
            debug!(game_id = %self.participant.game_id, "view visible again; fetching");
            self.fetch(false).await;
            return;
        }
        self.ensure_scheduled();
        self.publish();
    }

    async fn on_connectivity(&mut self, online: bool) {
        let was = std::mem::replace(&mut self.online, online);
        if online && !was {
            debug!(game_id = %self.participant.game_id, "back online; forcing a fetch");
            self.fetch(true).await;
            return;
        }
        self.ensure_scheduled();
        self.publish();
    }

    /// Pull the current state and fold it into the cache.
    async fn fetch(&mut self, forced: bool) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        let etag = if forced { None } else { self.etag.clone() };
        let participant = Arc::clone(&self.participant);
        let request = self.api.fetch_game(
            &participant.game_id,
            &participant.player_id,
            etag.as_deref(),
        );
        let outcome = tokio::time::timeout(self.fetch_timeout, request)
            .await
            .unwrap_or_else(|_| Err(ApiError::network("state fetch timed out")));

        match outcome {
            Ok(FetchOutcome::Modified { view, etag }) => {
                self.schedule.record_success();
                self.last_error = None;
                let accepted = self.store_view(view, None);
                self.etag = if accepted { etag } else { None };
            }
            Ok(FetchOutcome::NotModified) => {
                debug!(game_id = %participant.game_id, "state not modified");
                self.schedule.record_success();
                self.last_error = None;
            }
            Err(err) => {
                self.schedule.record_failure();
                warn!(
                    game_id = %participant.game_id,
                    failures = self.schedule.failures(),
                    "state fetch failed: {err}"
                );
                self.last_error = Some(err);
            }
        }
        self.reschedule();
        self.publish();
    }

    /// Replace the cached view unless `view` is known to be older. Returns
    /// whether it was stored.
    fn store_view(&mut self, view: GameView, received_at: Option<i64>) -> bool {
        let game_id = &self.participant.game_id;
        let incoming = view.stamp(received_at);
        if let Some(current) = self.cache.stamp(game_id) {
            if incoming.precedes(&current) {
                debug!(%game_id, ?incoming, ?current, "discarding out-of-order fetched state");
                return false;
            }
        }
        self.cache.set_stamped(game_id, view, incoming);
        true
    }

    fn push_unavailable(&self) -> bool {
        !self.push_enabled || self.link_lost
    }

    fn polling_active(&self) -> bool {
        self.push_unavailable() && self.visible && self.online && !self.base_interval().is_zero()
    }

    fn base_interval(&self) -> std::time::Duration {
        let view = self.cache.get(&self.participant.game_id);
        base_interval(view.as_deref())
    }

    /// Start a fresh poll interval from now, or stop polling.
    fn reschedule(&mut self) {
        self.next_poll = None;
        self.ensure_scheduled();
    }

    /// Arm the poll deadline if polling should run and none is armed; disarm
    /// it if polling should not run.
    fn ensure_scheduled(&mut self) {
        if !self.polling_active() {
            if self.next_poll.take().is_some() {
                debug!(game_id = %self.participant.game_id, "fallback polling paused");
            }
            return;
        }
        if self.next_poll.is_none() {
            let interval = self.schedule.effective(self.base_interval());
            debug!(
                game_id = %self.participant.game_id,
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                "next poll scheduled"
            );
            self.next_poll = Some(Instant::now() + interval);
        }
    }

    fn publish(&self) {
        let status = SyncStatus {
            view: self.cache.read(&self.participant.game_id),
            connection: self.connection,
            error: self.last_error.clone(),
            polling: self.polling_active(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::Provenance;
    use crate::protocol::{GamePhase, PlayerSlot};

    #[test]
    fn host_signals_clones_share_state() {
        let signals = HostSignals::new();
        let ui = signals.clone();
        assert!(signals.is_visible() && signals.is_online());

        ui.set_visible(false);
        ui.set_online(false);
        assert!(!signals.is_visible());
        assert!(!signals.is_online());
    }

    #[test]
    fn status_reports_staleness_from_provenance() {
        let view = GameView {
            game_id: "g1".into(),
            phase: GamePhase::Waiting,
            player1: PlayerSlot {
                id: "p1".into(),
                name: "Ada".into(),
                completed: false,
            },
            player2: None,
            current_turn: None,
            guesses: vec![],
            winner: None,
            my_turn: false,
            version: None,
            updated_at: None,
        };
        let mut status = SyncStatus {
            view: Some(SyncedView {
                view: Arc::new(view),
                provenance: Provenance::Cached {
                    captured_at: chrono::Utc::now(),
                },
            }),
            ..SyncStatus::default()
        };
        assert!(status.is_stale());

        if let Some(v) = status.view.as_mut() {
            v.provenance = Provenance::Live;
        }
        assert!(!status.is_stale());
        assert!(!SyncStatus::default().is_stale());
    }
}
