//! Folding push messages into the state cache.
//!
//! The push channel delivers two kinds of information: complete game states,
//! which replace the cached view outright, and bare notifications, which say
//! "something changed" without carrying a trustworthy state. The
//! [`Reconciler`] applies the former and turns the latter into a single
//! pending pull, never merging partial fields into the current view.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::StateCache;
use crate::protocol::{GameId, GameView, PushMessage};

/// What [`Reconciler::apply`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The cached view was replaced.
    Replaced(Arc<GameView>),
    /// The message carried a state older than the cached one and was dropped.
    Stale,
    /// The message was a notification; a pull is now pending.
    RefreshRequired,
    /// Nothing to do.
    Ignored,
}

/// Applies push messages for one game to a [`StateCache`].
#[derive(Debug)]
pub struct Reconciler {
    game_id: GameId,
    refresh_pending: bool,
}

impl Reconciler {
    pub fn new(game_id: impl Into<GameId>) -> Self {
        Self {
            game_id: game_id.into(),
            refresh_pending: false,
        }
    }

    /// Apply one message.
    pub fn apply(&mut self, cache: &mut StateCache, msg: PushMessage) -> Reconciliation {
        match msg {
            PushMessage::GameState { view, timestamp } => {
                if view.game_id != self.game_id {
                    warn!(
                        expected = %self.game_id,
                        got = %view.game_id,
                        "ignoring game state for another game"
                    );
                    return Reconciliation::Ignored;
                }
                let incoming = view.stamp(timestamp);
                if let Some(current) = cache.stamp(&self.game_id) {
                    if incoming.precedes(&current) {
                        debug!(
                            game_id = %self.game_id,
                            ?incoming,
                            ?current,
                            "discarding out-of-order game state"
                        );
                        return Reconciliation::Stale;
                    }
                }
                let view = cache.set_stamped(&self.game_id, *view, incoming);
                Reconciliation::Replaced(view)
            }
            PushMessage::PlayerJoined { .. } | PushMessage::GameCompleted { .. } => {
                if self.refresh_pending {
                    debug!(game_id = %self.game_id, "refresh already pending; coalescing");
                }
                self.refresh_pending = true;
                Reconciliation::RefreshRequired
            }
            PushMessage::Connected { connection_id } => {
                debug!(game_id = %self.game_id, ?connection_id, "push channel acknowledged");
                Reconciliation::Ignored
            }
            PushMessage::Pong => Reconciliation::Ignored,
            PushMessage::Error { message } => {
                warn!(game_id = %self.game_id, "push channel reported error: {message}");
                Reconciliation::Ignored
            }
            PushMessage::Unknown { kind } => {
                debug!(game_id = %self.game_id, kind, "ignoring unknown push message");
                Reconciliation::Ignored
            }
        }
    }

    /// Whether a notification is waiting for a pull.
    pub fn refresh_pending(&self) -> bool {
        self.refresh_pending
    }

    /// Claim the pending pull. Returns `true` at most once per batch of
    /// notifications.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }
}
