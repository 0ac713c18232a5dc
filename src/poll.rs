//! Fallback polling cadence.
//!
//! When the push channel is unavailable the view is kept fresh by pulling
//! the game state. How often depends on what the player is waiting for, and
//! consecutive failed pulls stretch the interval exponentially up to a
//! ceiling.
//!
//! | Phase       | My turn | Interval |
//! |-------------|---------|----------|
//! | `Waiting`   | any     | 10 s     |
//! | `Active`    | yes     | 2 s      |
//! | `Active`    | no      | 5 s      |
//! | `Completed` | any     | stopped  |
//! | no state    |         | 5 s      |

use std::time::Duration;

use crate::config::SyncConfig;
use crate::protocol::{GamePhase, GameView};

/// Interval while waiting for an opponent to join.
pub const WAITING_INTERVAL: Duration = Duration::from_millis(10_000);

/// Interval while it is the local player's turn.
pub const MY_TURN_INTERVAL: Duration = Duration::from_millis(2_000);

/// Interval while waiting on the opponent, and when nothing is known yet.
pub const THEIR_TURN_INTERVAL: Duration = Duration::from_millis(5_000);

/// Base poll interval for a game in `phase`. [`Duration::ZERO`] means polling
/// is stopped.
pub fn interval_for(phase: GamePhase, my_turn: bool) -> Duration {
    match phase {
        GamePhase::Waiting => WAITING_INTERVAL,
        GamePhase::Active if my_turn => MY_TURN_INTERVAL,
        GamePhase::Active => THEIR_TURN_INTERVAL,
        GamePhase::Completed => Duration::ZERO,
        GamePhase::Unknown => THEIR_TURN_INTERVAL,
    }
}

/// Base poll interval for the current view, or the default when there is none.
pub fn base_interval(view: Option<&GameView>) -> Duration {
    view.map_or(THEIR_TURN_INTERVAL, |v| interval_for(v.phase, v.my_turn))
}

/// Failure-aware poll interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    failures: u32,
    ceiling: Duration,
    max_exponent: u32,
}

impl PollSchedule {
    pub fn new(ceiling: Duration, max_exponent: u32) -> Self {
        Self {
            failures: 0,
            ceiling,
            max_exponent,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.poll_ceiling, config.poll_max_exponent)
    }

    /// `min(base * 2^min(failures, max_exponent), ceiling)`. A zero base stays
    /// zero.
    pub fn effective(&self, base: Duration) -> Duration {
        if base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = self.failures.min(self.max_exponent);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        base.checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.ceiling)
    }

    /// A pull succeeded (including "not modified").
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// A pull failed or timed out.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
