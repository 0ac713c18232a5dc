//! In-memory game state register backed by the offline store.
//!
//! [`StateCache`] holds exactly one current [`GameView`] per game id. Every
//! write replaces the whole view (never a field-level merge) and mirrors it
//! to the [`OfflineStore`] as a fresh [`CacheEntry`]. The cache has a single
//! owner; readers observe published [`SyncedView`]s instead of sharing the
//! cache itself.
//!
//! The store is read once per game, by [`load_snapshot`](StateCache::load_snapshot).
//! After that [`read`](StateCache::read) works from memory only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{GameId, GameView, OrderingStamp};
use crate::store::{CacheEntry, OfflineStore};

/// Where a displayed view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Received from the push channel or the API during this mount.
    Live,
    /// Read from the offline store; may be stale.
    Cached { captured_at: DateTime<Utc> },
}

/// A view together with its provenance, as handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedView {
    pub view: Arc<GameView>,
    pub provenance: Provenance,
}

impl SyncedView {
    /// Whether the UI must label this view as possibly stale.
    pub fn is_cached(&self) -> bool {
        matches!(self.provenance, Provenance::Cached { .. })
    }
}

struct Slot {
    view: Arc<GameView>,
    stamp: OrderingStamp,
}

/// Single-writer register of current game views.
pub struct StateCache {
    slots: HashMap<GameId, Slot>,
    /// Snapshots loaded from the store for games with no in-memory view yet.
    snapshots: HashMap<GameId, CacheEntry>,
    store: Box<dyn OfflineStore>,
    horizon: Duration,
}

impl StateCache {
    /// A cache persisting to `store`, serving snapshots for `horizon`.
    pub fn new(store: impl OfflineStore, horizon: Duration) -> Self {
        Self::with_boxed_store(Box::new(store), horizon)
    }

    pub fn with_boxed_store(store: Box<dyn OfflineStore>, horizon: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            snapshots: HashMap::new(),
            store,
            horizon,
        }
    }

    /// The current in-memory view for `game_id`.
    pub fn get(&self, game_id: &str) -> Option<Arc<GameView>> {
        self.slots.get(game_id).map(|slot| Arc::clone(&slot.view))
    }

    /// Ordering metadata of the current in-memory view.
    pub fn stamp(&self, game_id: &str) -> Option<OrderingStamp> {
        self.slots.get(game_id).map(|slot| slot.stamp)
    }

    /// Replace the view for `game_id`, stamped from the view's own metadata.
    pub fn set(&mut self, game_id: &str, view: GameView) -> Arc<GameView> {
        let stamp = view.stamp(None);
        self.set_stamped(game_id, view, stamp)
    }

    /// Replace the view for `game_id` with an explicit ordering stamp and
    /// persist a fresh snapshot. Store failures are logged, not returned: the
    /// in-memory view stays authoritative.
    pub fn set_stamped(
        &mut self,
        game_id: &str,
        view: GameView,
        stamp: OrderingStamp,
    ) -> Arc<GameView> {
        let entry = CacheEntry::new(view.clone(), Utc::now(), self.horizon);
        if let Err(e) = self.store.put(game_id, entry) {
            warn!(game_id, "failed to persist offline snapshot: {e}");
        }

        self.snapshots.remove(game_id);
        let view = Arc::new(view);
        self.slots.insert(
            game_id.to_owned(),
            Slot {
                view: Arc::clone(&view),
                stamp,
            },
        );
        view
    }

    /// The durable snapshot for `game_id`, or `None` once it has expired.
    pub fn get_cached(&self, game_id: &str) -> Option<CacheEntry> {
        self.get_cached_at(game_id, Utc::now())
    }

    /// [`get_cached`](Self::get_cached) evaluated at `now`. Expired entries
    /// are not removed here; [`sweep`](Self::sweep) does that.
    pub fn get_cached_at(&self, game_id: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.store.get(game_id) {
            Ok(Some(entry)) if !entry.is_expired(now) => Some(entry),
            Ok(Some(_)) => {
                debug!(game_id, "offline snapshot expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(game_id, "failed to read offline snapshot: {e}");
                None
            }
        }
    }

    /// Read the durable snapshot for `game_id` into memory so that
    /// [`read`](Self::read) can serve it. Does nothing if a view is already
    /// held for the game.
    pub fn load_snapshot(&mut self, game_id: &str) -> Option<SyncedView> {
        if !self.slots.contains_key(game_id) && !self.snapshots.contains_key(game_id) {
            if let Some(entry) = self.get_cached(game_id) {
                self.snapshots.insert(game_id.to_owned(), entry);
            }
        }
        self.read(game_id)
    }

    /// The best view to show for `game_id`: the in-memory view if there is
    /// one, otherwise a loaded snapshot labelled as cached while it is
    /// unexpired. Never touches the store.
    pub fn read(&self, game_id: &str) -> Option<SyncedView> {
        if let Some(view) = self.get(game_id) {
            return Some(SyncedView {
                view,
                provenance: Provenance::Live,
            });
        }
        self.snapshots
            .get(game_id)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .map(|entry| SyncedView {
                view: Arc::new(entry.view.clone()),
                provenance: Provenance::Cached {
                    captured_at: entry.captured_at,
                },
            })
    }

    /// Drop expired durable snapshots. Returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&mut self, now: DateTime<Utc>) -> usize {
        match self.store.sweep(now) {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "swept expired offline snapshots");
                }
                removed
            }
            Err(e) => {
                warn!("offline store sweep failed: {e}");
                0
            }
        }
    }
}

impl fmt::Debug for StateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCache")
            .field("games", &self.slots.len())
            .field("horizon", &self.horizon)
            .finish()
    }
}
