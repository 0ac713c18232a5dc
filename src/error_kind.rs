//! Error kinds for structured errors returned by the Word Duel request/response API.
//!
//! The backend reports failures as `{"kind": "...", "message": "..."}` bodies.
//! Kinds serialize using `SCREAMING_SNAKE_CASE` to match that format. Kinds the
//! client does not know about deserialize as [`ApiErrorKind::Unknown`] so that a
//! newer backend never breaks error handling on an older client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error kinds returned by the Word Duel API.
///
/// Use [`description()`](ApiErrorKind::description) for a human-readable explanation
/// and [`is_retryable()`](ApiErrorKind::is_retryable) to decide whether the fallback
/// poller should keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorKind {
    // Authentication errors
    Unauthorized,
    InvalidCredentials,
    UsernameTaken,

    // Validation errors
    ValidationError,
    InvalidWord,

    // Game errors
    GameNotFound,
    GameFull,
    GameNotActive,
    NotYourTurn,
    AlreadyJoined,

    // Throttling
    RateLimited,

    // Server errors
    InternalError,
    ServiceUnavailable,

    /// The request never produced a response (DNS, refused, reset, timeout).
    Network,

    /// A kind this client version does not recognise.
    #[serde(other)]
    Unknown,
}

impl ApiErrorKind {
    /// Returns a human-readable description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "You need to sign in again before doing that.",
            Self::InvalidCredentials => "The username or password is incorrect.",
            Self::UsernameTaken => "That username is already registered.",
            Self::ValidationError => "The request was rejected because some input was invalid.",
            Self::InvalidWord => "Words must be exactly five letters from the game dictionary.",
            Self::GameNotFound => "The game could not be found. It may have expired.",
            Self::GameFull => "The game already has two players.",
            Self::GameNotActive => "The game is not accepting guesses right now.",
            Self::NotYourTurn => "It is your opponent's turn.",
            Self::AlreadyJoined => "You are already a player in this game.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::InternalError => "The server hit an unexpected error. Please try again.",
            Self::ServiceUnavailable => "The game service is temporarily unavailable.",
            Self::Network => "The game service could not be reached. Check your connection.",
            Self::Unknown => "An unexpected error occurred.",
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::InternalError | Self::ServiceUnavailable | Self::Network
        )
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn kinds_use_screaming_snake_case() {
        let json = serde_json::to_string(&ApiErrorKind::NotYourTurn).unwrap();
        assert_eq!(json, "\"NOT_YOUR_TURN\"");
        let kind: ApiErrorKind = serde_json::from_str("\"GAME_NOT_FOUND\"").unwrap();
        assert_eq!(kind, ApiErrorKind::GameNotFound);
    }

    #[test]
    fn unrecognised_kind_is_unknown() {
        let kind: ApiErrorKind = serde_json::from_str("\"WORD_TOO_SPICY\"").unwrap();
        assert_eq!(kind, ApiErrorKind::Unknown);
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ApiErrorKind::Network.is_retryable());
        assert!(ApiErrorKind::ServiceUnavailable.is_retryable());
        assert!(!ApiErrorKind::NotYourTurn.is_retryable());
        assert!(!ApiErrorKind::InvalidCredentials.is_retryable());
    }
}
