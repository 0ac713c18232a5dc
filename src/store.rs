//! Durable offline store for game snapshots.
//!
//! The [`OfflineStore`] trait is a keyed put/get/sweep interface over
//! `game id -> CacheEntry`. No transactional guarantees are required: a
//! torn or unreadable entry is treated as missing.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: in-process map. Clones share the same backing map,
//!   which makes "unmount, then mount again" easy to exercise in tests.
//! - [`FileStore`]: one JSON file per game under a directory, written via a
//!   temporary file and rename.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::protocol::GameView;

/// Directory name used under the platform cache directory.
const STORE_DIR_NAME: &str = "word-duel-sync";

/// File name prefix and extension of stored snapshots. The prefix keeps an
/// empty game id from producing a bare `.json` dotfile.
const ENTRY_PREFIX: &str = "game-";
const ENTRY_EXTENSION: &str = "json";

/// A durable snapshot of one game view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub view: GameView,
    pub captured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Capture `view` at `captured_at`, usable for `horizon`.
    pub fn new(view: GameView, captured_at: DateTime<Utc>, horizon: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(horizon)
            .ok()
            .and_then(|h| captured_at.checked_add_signed(h))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            view,
            captured_at,
            expires_at,
        }
    }

    /// Whether the entry is past its expiry horizon at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Keyed storage for [`CacheEntry`] values.
///
/// Methods are called inline from the sync task, so they must be quick:
/// `put` runs once per accepted state change, `get` once per mount and
/// `sweep` once per mount. A store backed by slow or remote I/O should
/// buffer writes and return immediately.
pub trait OfflineStore: Send + 'static {
    /// Create or overwrite the entry for `game_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`], [`SyncError::Io`], or
    /// [`SyncError::Serialization`] if the entry could not be written.
    fn put(&mut self, game_id: &str, entry: CacheEntry) -> Result<()>;

    /// Read the entry for `game_id`, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be read.
    fn get(&self, game_id: &str) -> Result<Option<CacheEntry>>;

    /// Delete the entry for `game_id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be modified.
    fn remove(&mut self, game_id: &str) -> Result<()>;

    /// Delete every entry expired at `now`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be scanned.
    fn sweep(&mut self, now: DateTime<Utc>) -> Result<usize>;
}

// ── MemoryStore ─────────────────────────────────────────────────────

/// In-process store. Clones share one map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))
    }
}

impl OfflineStore for MemoryStore {
    fn put(&mut self, game_id: &str, entry: CacheEntry) -> Result<()> {
        self.lock()?.insert(game_id.to_owned(), entry);
        Ok(())
    }

    fn get(&self, game_id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.get(game_id).cloned())
    }

    fn remove(&mut self, game_id: &str) -> Result<()> {
        self.lock()?.remove(game_id);
        Ok(())
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

// ── FileStore ───────────────────────────────────────────────────────

/// One JSON file per game id under a directory, named `game-<id>.json`.
///
/// Each entry is a few kilobytes written with plain blocking file I/O. This
/// fits the cost rule on [`OfflineStore`] for a local disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Use `word-duel-sync` under the platform cache directory, falling back
    /// to the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the directory cannot be created.
    pub fn in_default_location() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join(STORE_DIR_NAME))
    }

    /// The directory holding the snapshots.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, game_id: &str) -> PathBuf {
        let name: String = url::form_urlencoded::byte_serialize(game_id.as_bytes()).collect();
        self.dir.join(format!("{ENTRY_PREFIX}{name}.{ENTRY_EXTENSION}"))
    }

    fn is_entry_path(path: &Path) -> bool {
        let prefixed = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(ENTRY_PREFIX));
        prefixed && path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
    }

    fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl OfflineStore for FileStore {
    fn put(&mut self, game_id: &str, entry: CacheEntry) -> Result<()> {
        let path = self.path_for(game_id);
        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(&entry)?;
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(game_id, path = %path.display(), "snapshot written");
        Ok(())
    }

    fn get(&self, game_id: &str) -> Result<Option<CacheEntry>> {
        Self::read_entry(&self.path_for(game_id))
    }

    fn remove(&mut self, game_id: &str) -> Result<()> {
        match fs::remove_file(self.path_for(game_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if !Self::is_entry_path(&path) {
                continue;
            }
            let expired = match Self::read_entry(&path) {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                Err(e) => {
                    warn!(path = %path.display(), "discarding unreadable snapshot: {e}");
                    true
                }
            };
            if expired {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::protocol::{GamePhase, PlayerSlot};

    fn view(game_id: &str) -> GameView {
        GameView {
            game_id: game_id.into(),
            phase: GamePhase::Active,
            player1: PlayerSlot {
                id: "p1".into(),
                name: "Ada".into(),
                completed: false,
            },
            player2: Some(PlayerSlot {
                id: "p2".into(),
                name: "Grace".into(),
                completed: false,
            }),
            current_turn: Some("p1".into()),
            guesses: vec![],
            winner: None,
            my_turn: true,
            version: Some(3),
            updated_at: None,
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("word-duel-sync-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn entry_expiry_is_inclusive_of_horizon() {
        let now = Utc::now();
        let entry = CacheEntry::new(view("g1"), now, Duration::from_secs(60));
        assert!(!entry.is_expired(now + chrono::Duration::seconds(59)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn huge_horizon_saturates() {
        let entry = CacheEntry::new(view("g1"), Utc::now(), Duration::MAX);
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn memory_store_clones_share_entries() {
        let mut store = MemoryStore::new();
        let reader = store.clone();
        let entry = CacheEntry::new(view("g1"), Utc::now(), Duration::from_secs(60));
        store.put("g1", entry.clone()).unwrap();
        assert_eq!(reader.get("g1").unwrap(), Some(entry));
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn memory_store_sweep_drops_only_expired() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store
            .put("old", CacheEntry::new(view("old"), now, Duration::from_secs(1)))
            .unwrap();
        store
            .put("new", CacheEntry::new(view("new"), now, Duration::from_secs(600)))
            .unwrap();

        let removed = store.sweep(now + chrono::Duration::seconds(5)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("new").unwrap().is_some());
    }

    #[test]
    fn file_store_round_trip_and_remove() {
        let dir = temp_dir();
        let mut store = FileStore::new(&dir).unwrap();
        let entry = CacheEntry::new(view("g/1"), Utc::now(), Duration::from_secs(60));

        store.put("g/1", entry.clone()).unwrap();
        assert_eq!(store.get("g/1").unwrap(), Some(entry));
        assert!(store.get("g2").unwrap().is_none());

        store.remove("g/1").unwrap();
        store.remove("g/1").unwrap();
        assert!(store.get("g/1").unwrap().is_none());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn file_store_sweep_removes_expired_and_corrupt() {
        let dir = temp_dir();
        let mut store = FileStore::new(&dir).unwrap();
        let now = Utc::now();
        store
            .put("old", CacheEntry::new(view("old"), now, Duration::from_secs(1)))
            .unwrap();
        store
            .put("new", CacheEntry::new(view("new"), now, Duration::from_secs(600)))
            .unwrap();
        fs::write(dir.join("game-broken.json"), b"{not json").unwrap();
        fs::write(dir.join("notes.json"), b"{not json").unwrap();

        let removed = store.sweep(now + chrono::Duration::seconds(5)).unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("new").unwrap().is_some());
        assert!(dir.join("notes.json").exists());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn file_store_empty_game_id_is_swept() {
        let dir = temp_dir();
        let mut store = FileStore::new(&dir).unwrap();
        let now = Utc::now();
        store
            .put("", CacheEntry::new(view(""), now, Duration::from_secs(1)))
            .unwrap();
        assert!(dir.join("game-.json").exists());
        assert!(store.get("").unwrap().is_some());

        let removed = store.sweep(now + chrono::Duration::seconds(5)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("").unwrap().is_none());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        fs::remove_dir_all(dir).unwrap();
    }
}
