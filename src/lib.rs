//! # Word Duel Sync
//!
//! Client-side real-time synchronization for Word Duel, a turn-based
//! two-player word guessing game.
//!
//! The crate keeps one mounted game view fresh from two sources: a push
//! channel that streams state changes, and a request/response API that is
//! polled whenever push is unavailable. The latest state is mirrored to an
//! offline store so the view can be shown, labelled as stale, when the
//! network is gone.
//!
//! ## Components
//!
//! - [`ConnectionManager`]: owns the push channel, with heartbeats and a
//!   bounded fixed-schedule reconnection policy.
//! - [`Reconciler`]: folds push messages into the cache; notifications
//!   trigger a single pull instead of partial merges.
//! - [`poll`]: the fallback polling cadence and its failure backoff.
//! - [`StateCache`] and [`OfflineStore`]: the single-writer state register
//!   and its durable mirror.
//! - [`GameSync`]: wires everything together for one mounted view.
//!
//! ## Features
//!
//! - `transport-websocket` (default): [`WebSocketConnector`] for the push
//!   channel.
//! - `http-api` (default): [`HttpGameApi`](api::HttpGameApi) for the
//!   request/response API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-api"))]
//! # async fn example() -> Result<(), word_duel_sync::SyncError> {
//! use word_duel_sync::api::HttpGameApi;
//! use word_duel_sync::{
//!     FileStore, GameSync, HostSignals, Participant, SyncConfig, WebSocketConnector,
//! };
//!
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
//!     if let Some(synced) = &current.view {
//!         println!("my turn: {} (stale: {})", synced.view.my_turn, current.is_stale());
//!     }
//! }
//! sync.unmount();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_kind;
pub mod poll;
pub mod protocol;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{ApiError, FetchOutcome, GameApi};
pub use cache::{Provenance, StateCache, SyncedView};
pub use config::SyncConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use error::SyncError;
pub use error_kind::ApiErrorKind;
pub use poll::PollSchedule;
pub use protocol::{GamePhase, GameView, Guess, OutboundMessage, PushMessage};
pub use reconcile::{Reconciler, Reconciliation};
pub use store::{CacheEntry, FileStore, MemoryStore, OfflineStore};
pub use sync::{GameSync, HostSignals, Participant, SyncStatus};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
