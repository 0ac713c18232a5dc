//! Push-channel connection manager.
//!
//! [`ConnectionManager`] owns at most one push channel per mounted game view.
//! It is a thin handle around a background session task that opens the
//! channel through a [`Connector`], reads and parses inbound envelopes, sends
//! heartbeats, and reconnects with a fixed backoff schedule after unintended
//! drops. Inbound messages and diagnostics are delivered on a bounded
//! [`mpsc::Receiver<ConnectionEvent>`] returned from [`ConnectionManager::new`].
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//! Connected    -> Disconnected -> Reconnecting -> Connecting -> Connected | Failed
//! ```
//!
//! `Failed` is terminal until [`connect`](ConnectionManager::connect) is called
//! again. Only this module can publish a [`ConnectionState`]; everyone else
//! observes it through [`ConnectionManager::watch_state`].
//!
//! # Example
//!
//! ```rust,ignore
//! let (mut manager, mut events) = ConnectionManager::new(WebSocketConnector::new(), config);
//! manager.connect("wss://push.example.com/prod", "g1", "p1", "Ada")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ConnectionEvent::Message(msg) => { /* hand to the reconciler */ }
//!         ConnectionEvent::StateChanged(ConnectionState::Failed) => break,
//!         _ => {}
//!     }
//! }
//! manager.disconnect();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::protocol::{OutboundMessage, PushMessage};
use crate::transport::{Connector, Transport};

// ── State ───────────────────────────────────────────────────────────

/// Lifecycle state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No channel, and none is being opened.
    #[default]
    Disconnected,
    /// A channel is being opened.
    Connecting,
    /// The channel is open.
    Connected,
    /// The channel dropped; the next attempt is scheduled.
    Reconnecting,
    /// The reconnection budget is spent. Terminal until `connect` is called.
    Failed,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Reconnecting)
                | (Disconnected, Failed)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Failed)
                | (Connected, Disconnected)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnected)
                | (Failed, Connecting)
                | (Failed, Disconnected)
        )
    }

    /// Whether a session is opening, open, or waiting to retry.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A well-formed inbound push message.
    Message(PushMessage),
    /// The transport reported an error. The state change, if any, follows as
    /// a separate `StateChanged` once the channel has closed.
    TransportError(String),
    /// A reconnection attempt has been scheduled.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// An outbound message was dropped because the channel was not open.
    SendDropped(OutboundMessage),
}

// ── Session ─────────────────────────────────────────────────────────

/// Handles to one running session task.
struct Session {
    cmd_tx: mpsc::UnboundedSender<OutboundMessage>,
    cancelled: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.cancelled.load(Ordering::Acquire)
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns the push channel for one mounted game view.
///
/// Construct with [`ConnectionManager::new`], open with
/// [`connect`](Self::connect), tear down with [`disconnect`](Self::disconnect)
/// or [`shutdown`](Self::shutdown). Dropping the manager aborts the session
/// task.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: SyncConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    session: Option<Session>,
    /// Task of the most recently disconnected session, still closing.
    closing: Option<JoinHandle<()>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager in the `Disconnected` state.
    ///
    /// Returns the manager and the receiver for its [`ConnectionEvent`]s.
    #[must_use = "the event receiver must be used to receive push messages"]
    pub fn new(connector: C, config: SyncConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            connector: Arc::new(connector),
            config,
            state_tx: Arc::new(state_tx),
            event_tx,
            session: None,
            closing: None,
        };
        (manager, event_rx)
    }

    /// Open the push channel for `game_id` as `player_id`.
    ///
    /// Idempotent: while a session is connecting, connected, or waiting to
    /// reconnect this is a no-op, so repeated calls never open a second
    /// channel. After `disconnect` or `Failed` a new session is started.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEndpoint`] if `endpoint` is not a `ws://`
    /// or `wss://` URL.
    pub fn connect(
        &mut self,
        endpoint: &str,
        game_id: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<()> {
        if self.state().is_active() && self.session.as_ref().is_some_and(Session::is_live) {
            debug!(game_id, "push channel already open; ignoring connect");
            return Ok(());
        }

        let uri = channel_uri(endpoint, game_id, player_id, player_name)?;
        if let Some(stale) = self.session.take() {
            stale.task.abort();
        }
        if self.state().is_active() {
            // Left behind by a session task that died without finishing.
            publish_state(&self.state_tx, None, ConnectionState::Disconnected);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        if !publish_state(&self.state_tx, Some(&cancelled), ConnectionState::Connecting) {
            return Ok(());
        }
        emit_event(
            &self.event_tx,
            ConnectionEvent::StateChanged(ConnectionState::Connecting),
        );

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ctx = SessionContext {
            connector: Arc::clone(&self.connector),
            uri,
            game_id: game_id.to_owned(),
            config: self.config.clone(),
            state_tx: Arc::clone(&self.state_tx),
            event_tx: self.event_tx.clone(),
            cancelled: Arc::clone(&cancelled),
        };
        let task = tokio::spawn(session_loop(ctx, cmd_rx, shutdown_rx));

        self.session = Some(Session {
            cmd_tx,
            cancelled,
            shutdown_tx: Some(shutdown_tx),
            task,
        });
        Ok(())
    }

    /// Close the push channel on purpose.
    ///
    /// Cancels any scheduled reconnect, signals the session task to close the
    /// transport, and publishes `Disconnected`. No automatic reconnection
    /// happens afterwards. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("push channel: disconnect requested");
            session.cancelled.store(true, Ordering::Release);
            if let Some(tx) = session.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Some(previous) = self.closing.replace(session.task) {
                previous.abort();
            }
        }

        if publish_state(&self.state_tx, None, ConnectionState::Disconnected) {
            emit_event(
                &self.event_tx,
                ConnectionEvent::StateChanged(ConnectionState::Disconnected),
            );
        }
    }

    /// [`disconnect`](Self::disconnect), then wait for the session task to
    /// close its transport. The task is aborted if it does not finish within
    /// [`SyncConfig::shutdown_timeout`].
    pub async fn shutdown(&mut self) {
        self.disconnect();

        if let Some(mut task) = self.closing.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }
    }

    /// Queue a message on the open channel.
    ///
    /// Best effort: if the channel is not `Connected` the message is dropped
    /// and a [`ConnectionEvent::SendDropped`] diagnostic is emitted. Never
    /// blocks. Returns whether the message was queued.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if self.state() == ConnectionState::Connected {
            if let Some(session) = &self.session {
                if session.cmd_tx.send(message.clone()).is_ok() {
                    return true;
                }
            }
        }
        debug!(state = %self.state(), "push channel not open; dropping outbound message");
        emit_event(&self.event_tx, ConnectionEvent::SendDropped(message));
        false
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether the push channel is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        // Drop cannot await a graceful close; aborting drops the transport.
        if let Some(session) = self.session.take() {
            session.cancelled.store(true, Ordering::Release);
            session.task.abort();
        }
        if let Some(task) = self.closing.take() {
            task.abort();
        }
    }
}

/// Build the channel URI. Identity travels as query parameters because the
/// channel has no handshake message.
fn channel_uri(endpoint: &str, game_id: &str, player_id: &str, player_name: &str) -> Result<String> {
    let mut url = Url::parse(endpoint).map_err(|e| SyncError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(SyncError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    url.query_pairs_mut()
        .append_pair("gameId", game_id)
        .append_pair("playerId", player_id)
        .append_pair("playerName", player_name);
    Ok(url.into())
}

/// Apply `next` if the edge is allowed and the session (if any) has not been
/// cancelled. The check and the write happen under the watch channel's lock,
/// so a cancelled session can never publish after `disconnect` returns.
fn publish_state(
    state_tx: &watch::Sender<ConnectionState>,
    cancelled: Option<&AtomicBool>,
    next: ConnectionState,
) -> bool {
    let mut applied = false;
    state_tx.send_if_modified(|current| {
        if cancelled.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return false;
        }
        if *current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "refusing invalid connection state transition");
            return false;
        }
        debug!(from = %current, to = %next, "connection state");
        *current = next;
        applied = true;
        true
    });
    applied
}

/// Emit an event without blocking. If the channel is full the event is
/// dropped with a warning.
fn emit_event(event_tx: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "connection event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("connection event channel closed, receiver dropped");
        }
    }
}

// ── Session task ────────────────────────────────────────────────────

struct SessionContext<C: Connector> {
    connector: Arc<C>,
    uri: String,
    game_id: String,
    config: SyncConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    cancelled: Arc<AtomicBool>,
}

impl<C: Connector> SessionContext<C> {
    /// Publish a state change from the session task, waiting for room on the
    /// event channel if needed.
    async fn transition(&self, next: ConnectionState) -> bool {
        if !publish_state(&self.state_tx, Some(&self.cancelled), next) {
            return false;
        }
        if self
            .event_tx
            .send(ConnectionEvent::StateChanged(next))
            .await
            .is_err()
        {
            debug!("connection event channel closed, receiver dropped");
        }
        true
    }

    /// Publish `Failed` and end the session. The event is sent without
    /// waiting: a lagging consumer must not keep a finished session alive.
    fn fail(&self) {
        if publish_state(&self.state_tx, Some(&self.cancelled), ConnectionState::Failed) {
            emit_event(
                &self.event_tx,
                ConnectionEvent::StateChanged(ConnectionState::Failed),
            );
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        emit_event(&self.event_tx, event);
    }
}

/// How a connected phase ended.
enum LinkExit {
    /// Intentional: shutdown signal or manager dropped.
    Shutdown,
    /// The channel dropped or errored.
    Dropped,
}

/// Background session: connect, pump, and reconnect until shut down or the
/// reconnection budget is spent. Entered in the `Connecting` state.
async fn session_loop<C: Connector>(
    ctx: SessionContext<C>,
    mut cmd_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(game_id = %ctx.game_id, "session task started");
    let max_attempts = ctx.config.max_reconnect_attempts;
    // Reconnection attempts since the last successful open.
    let mut attempt: u32 = 0;

    loop {
        let opened = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received while connecting");
                return;
            }
            result = ctx.connector.connect(&ctx.uri) => result,
        };

        match opened {
            Ok(mut transport) => {
                if !ctx.transition(ConnectionState::Connected).await {
                    let _ = transport.close().await;
                    return;
                }
                info!(game_id = %ctx.game_id, "push channel connected");
                attempt = 0;

                match run_connected(&ctx, transport, &mut cmd_rx, &mut shutdown_rx).await {
                    LinkExit::Shutdown => return,
                    LinkExit::Dropped => {
                        if !ctx.transition(ConnectionState::Disconnected).await {
                            return;
                        }
                    }
                }
                if attempt >= max_attempts {
                    ctx.fail();
                    return;
                }
            }
            Err(e) => {
                warn!(game_id = %ctx.game_id, attempt, "push channel connect failed: {e}");
                ctx.emit(ConnectionEvent::TransportError(e.to_string()));
                if attempt >= max_attempts {
                    warn!(game_id = %ctx.game_id, "reconnection budget exhausted");
                    ctx.fail();
                    return;
                }
                if !ctx.transition(ConnectionState::Disconnected).await {
                    return;
                }
            }
        }

        attempt += 1;
        let delay = ctx.config.backoff_delay(attempt);
        if !ctx.transition(ConnectionState::Reconnecting).await {
            return;
        }
        debug!(
            game_id = %ctx.game_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );
        ctx.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received; reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if !ctx.transition(ConnectionState::Connecting).await {
            return;
        }
    }
}

/// Pump one open transport until it drops or the session is shut down.
async fn run_connected<C: Connector>(
    ctx: &SessionContext<C>,
    mut transport: C::Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> LinkExit {
    let period = ctx.config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                return LinkExit::Shutdown;
            }

            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, closing push channel");
                    let _ = transport.close().await;
                    return LinkExit::Shutdown;
                };
                if let Err(e) = send_outbound(&mut transport, &msg).await {
                    error!("push channel send error: {e}");
                    ctx.emit(ConnectionEvent::TransportError(e.to_string()));
                    let _ = transport.close().await;
                    return LinkExit::Dropped;
                }
            }

            _ = heartbeat.tick() => {
                debug!(game_id = %ctx.game_id, "sending heartbeat");
                if let Err(e) = send_outbound(&mut transport, &OutboundMessage::ping()).await {
                    error!("heartbeat send error: {e}");
                    ctx.emit(ConnectionEvent::TransportError(e.to_string()));
                    let _ = transport.close().await;
                    return LinkExit::Dropped;
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match PushMessage::parse(&text) {
                        Ok(msg) => {
                            debug!(kind = msg.kind(), "push message received");
                            ctx.emit(ConnectionEvent::Message(msg));
                        }
                        Err(e) => {
                            warn!("dropping malformed push payload: {e}; raw: {text}");
                        }
                    },
                    Some(Err(e)) => {
                        // Reported once; the close below is the only state change.
                        error!("push channel receive error: {e}");
                        ctx.emit(ConnectionEvent::TransportError(e.to_string()));
                        let _ = transport.close().await;
                        return LinkExit::Dropped;
                    }
                    None => {
                        debug!(game_id = %ctx.game_id, "push channel closed by server");
                        return LinkExit::Dropped;
                    }
                }
            }
        }
    }
}

async fn send_outbound<T: Transport>(transport: &mut T, msg: &OutboundMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    transport.send(json).await
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// A connector whose transports never open.
    struct RefusingConnector;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), SyncError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SyncError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), SyncError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        type Transport = NeverTransport;

        async fn connect(&self, _uri: &str) -> std::result::Result<NeverTransport, SyncError> {
            Err(SyncError::Connect("refused".into()))
        }
    }

    #[test]
    fn documented_edges_are_allowed() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Connecting));
    }

    #[test]
    fn undocumented_edges_are_refused() {
        use ConnectionState::*;
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Reconnecting));
        assert!(!Connected.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connected));
    }

    #[test]
    fn publish_state_ignores_cancelled_sessions() {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let cancelled = AtomicBool::new(true);
        assert!(!publish_state(&tx, Some(&cancelled), ConnectionState::Connecting));
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
        assert!(publish_state(&tx, None, ConnectionState::Connecting));
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }

    #[test]
    fn channel_uri_encodes_identity() {
        let uri = channel_uri("wss://push.example.com/prod", "g 1", "p1", "Ada Lovelace").unwrap();
        assert_eq!(
            uri,
            "wss://push.example.com/prod?gameId=g+1&playerId=p1&playerName=Ada+Lovelace"
        );
    }

    #[test]
    fn channel_uri_rejects_http_and_garbage() {
        assert!(matches!(
            channel_uri("https://example.com", "g", "p", "n"),
            Err(SyncError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            channel_uri("not a url", "g", "p", "n"),
            Err(SyncError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped_with_diagnostic() {
        let (manager, mut events) = ConnectionManager::new(RefusingConnector, SyncConfig::new());
        assert!(!manager.send(OutboundMessage::ping()));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectionEvent::SendDropped(_)));
    }

    #[tokio::test]
    async fn invalid_endpoint_leaves_state_untouched() {
        let (mut manager, _events) = ConnectionManager::new(RefusingConnector, SyncConfig::new());
        let err = manager.connect("http://nope", "g", "p", "n").unwrap_err();
        assert!(matches!(err, SyncError::InvalidEndpoint { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_fails_after_first_refusal() {
        let config = SyncConfig::new().with_max_reconnect_attempts(0);
        let (mut manager, _events) = ConnectionManager::new(RefusingConnector, config);
        let mut state = manager.watch_state();
        manager.connect("ws://push.test/", "g", "p", "n").unwrap();

        state
            .wait_for(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn debug_impl_reports_state() {
        let (manager, _events) = ConnectionManager::new(RefusingConnector, SyncConfig::new());
        let debug_str = format!("{manager:?}");
        assert!(debug_str.contains("ConnectionManager"));
        assert!(debug_str.contains("Disconnected"));
    }
}
