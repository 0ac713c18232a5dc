//! Wire types for the Word Duel push channel and request/response API.
//!
//! Both surfaces speak camelCase JSON. Game state is always transmitted as a
//! complete [`GameView`]; the client never patches a view field by field.
//!
//! Push messages arrive wrapped in an envelope:
//!
//! ```json
//! { "type": "GAME_STATE", "payload": { "gameId": "g1", ... }, "timestamp": 1760000000000 }
//! ```
//!
//! [`PushMessage::parse`] turns one envelope into a typed message. Envelope
//! types this client does not know become [`PushMessage::Unknown`] instead of
//! failing, so the backend can add message types without breaking old clients.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque game identifier issued by the backend.
pub type GameId = String;

/// Opaque player identifier issued by the backend.
pub type PlayerId = String;

// ── Game state ──────────────────────────────────────────────────────

/// Lifecycle stage of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// Created, waiting for the second player to join.
    #[default]
    Waiting,
    /// Both players joined; guesses are being exchanged.
    Active,
    /// A player guessed the opponent's word or the game was abandoned.
    Completed,
    /// A phase this client version does not recognise.
    #[serde(other)]
    Unknown,
}

/// One of the two player seats in a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSlot {
    pub id: PlayerId,
    pub name: String,
    /// Whether this player has finished (guessed the opposing word).
    #[serde(default)]
    pub completed: bool,
}

/// A single guess. Append-only; never modified after the backend records it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub word: String,
    /// Number of letters shared with the hidden word.
    pub matches: u8,
    pub is_win: bool,
    pub timestamp: DateTime<Utc>,
}

/// The player-facing projection of a match.
///
/// A `GameView` is an immutable snapshot. Every update replaces the previous
/// snapshot wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: GameId,
    #[serde(rename = "status")]
    pub phase: GamePhase,
    pub player1: PlayerSlot,
    #[serde(default)]
    pub player2: Option<PlayerSlot>,
    /// Player whose turn it is, if the game is active.
    #[serde(default)]
    pub current_turn: Option<PlayerId>,
    #[serde(default)]
    pub guesses: Vec<Guess>,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    /// Whether it is the viewing player's turn. Missing or `null` is `false`.
    #[serde(default, deserialize_with = "null_as_false")]
    pub my_turn: bool,
    /// Monotonic state version, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Last modification time in epoch milliseconds, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GameView {
    /// Returns the seat occupied by `player_id`, if any.
    pub fn slot(&self, player_id: &str) -> Option<&PlayerSlot> {
        if self.player1.id == player_id {
            return Some(&self.player1);
        }
        self.player2.as_ref().filter(|p| p.id == player_id)
    }

    /// Returns the seat of the other player relative to `player_id`.
    pub fn opponent(&self, player_id: &str) -> Option<&PlayerSlot> {
        if self.player1.id == player_id {
            self.player2.as_ref()
        } else if self.player2.as_ref().is_some_and(|p| p.id == player_id) {
            Some(&self.player1)
        } else {
            None
        }
    }

    /// Guesses made by `player_id`, in the order they were recorded.
    pub fn guesses_by<'a>(&'a self, player_id: &'a str) -> impl Iterator<Item = &'a Guess> + 'a {
        self.guesses.iter().filter(move |g| g.player_id == player_id)
    }

    /// Ordering metadata for this view. `received_at` is the push envelope
    /// timestamp, used only when the view carries no `updatedAt` of its own.
    pub fn stamp(&self, received_at: Option<i64>) -> OrderingStamp {
        OrderingStamp {
            version: self.version,
            at_ms: self.updated_at.or(received_at),
        }
    }
}

/// Ordering metadata attached to a view when it enters the state cache.
///
/// The backend does not version every payload, so ordering is best effort:
/// versions are compared when both sides have one, otherwise timestamps,
/// otherwise the newer arrival wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderingStamp {
    pub version: Option<u64>,
    pub at_ms: Option<i64>,
}

impl OrderingStamp {
    /// Returns `true` if `self` is known to be strictly older than `other`.
    pub fn precedes(&self, other: &OrderingStamp) -> bool {
        if let (Some(mine), Some(theirs)) = (self.version, other.version) {
            return mine < theirs;
        }
        match (self.at_ms, other.at_ms) {
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => false,
        }
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

// ── Push channel: inbound ───────────────────────────────────────────

/// Envelope type tags sent by the backend.
pub mod kind {
    pub const CONNECTED: &str = "CONNECTED";
    pub const GAME_STATE: &str = "GAME_STATE";
    pub const PLAYER_JOINED: &str = "PLAYER_JOINED";
    pub const GAME_COMPLETED: &str = "GAME_COMPLETED";
    pub const PONG: &str = "PONG";
    pub const ERROR: &str = "ERROR";
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedPayload {
    #[serde(default)]
    connection_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerJoinedPayload {
    #[serde(default)]
    player_id: Option<PlayerId>,
    #[serde(default)]
    player_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameCompletedPayload {
    #[serde(default)]
    winner: Option<PlayerId>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// A typed inbound push message.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// The backend acknowledged the channel.
    Connected { connection_id: Option<String> },
    /// Complete authoritative state for the game.
    GameState {
        view: Box<GameView>,
        /// Envelope timestamp (epoch milliseconds).
        timestamp: Option<i64>,
    },
    /// The second player joined. Carries no trustworthy state.
    PlayerJoined {
        player_id: Option<PlayerId>,
        player_name: Option<String>,
    },
    /// The game finished. Carries no trustworthy state.
    GameCompleted { winner: Option<PlayerId> },
    /// Reply to an outbound heartbeat.
    Pong,
    /// The backend reported a problem with this channel.
    Error { message: String },
    /// An envelope type this client version does not handle.
    Unknown { kind: String },
}

impl PushMessage {
    /// Parse one envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the text is not an envelope or a
    /// known envelope type carries a payload of the wrong shape.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let msg = match raw.kind.as_str() {
            kind::CONNECTED => {
                let p: ConnectedPayload = payload_or_default(raw.payload)?;
                Self::Connected {
                    connection_id: p.connection_id,
                }
            }
            kind::GAME_STATE => Self::GameState {
                view: Box::new(serde_json::from_value(raw.payload)?),
                timestamp: raw.timestamp,
            },
            kind::PLAYER_JOINED => {
                let p: PlayerJoinedPayload = payload_or_default(raw.payload)?;
                Self::PlayerJoined {
                    player_id: p.player_id,
                    player_name: p.player_name,
                }
            }
            kind::GAME_COMPLETED => {
                let p: GameCompletedPayload = payload_or_default(raw.payload)?;
                Self::GameCompleted { winner: p.winner }
            }
            kind::PONG => Self::Pong,
            kind::ERROR => {
                let p: ErrorPayload = payload_or_default(raw.payload)?;
                Self::Error { message: p.message }
            }
            _ => Self::Unknown { kind: raw.kind },
        };
        Ok(msg)
    }

    /// The envelope type tag this message was parsed from.
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected { .. } => kind::CONNECTED,
            Self::GameState { .. } => kind::GAME_STATE,
            Self::PlayerJoined { .. } => kind::PLAYER_JOINED,
            Self::GameCompleted { .. } => kind::GAME_COMPLETED,
            Self::Pong => kind::PONG,
            Self::Error { .. } => kind::ERROR,
            Self::Unknown { kind } => kind,
        }
    }
}

fn payload_or_default<T: DeserializeOwned + Default>(
    payload: serde_json::Value,
) -> Result<T, serde_json::Error> {
    if payload.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(payload)
    }
}

// ── Push channel: outbound ──────────────────────────────────────────

/// Messages sent from the client over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    /// Heartbeat. Keeps the channel warm and surfaces half-open sockets.
    Ping {
        /// Epoch milliseconds at send time.
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// A heartbeat stamped with the current wall-clock time.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
