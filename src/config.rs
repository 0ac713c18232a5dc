//! Configuration for the sync client.
//!
//! [`SyncConfig`] carries every tunable of the connection manager, fallback
//! poller, and state cache. All fields have defaults; use the `with_*`
//! builder methods to override them.
//!
//! ```
//! use std::time::Duration;
//! use word_duel_sync::SyncConfig;
//!
//! let config = SyncConfig::new()
//!     .with_push_endpoint("wss://push.example.com/prod")
//!     .with_max_reconnect_attempts(5)
//!     .with_heartbeat_interval(Duration::from_secs(120));
//!
//! assert_eq!(config.push_endpoint.as_deref(), Some("wss://push.example.com/prod"));
//! assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
//! ```

use std::time::Duration;

/// Default capacity of the bounded connection event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for a graceful shutdown of the push channel task.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default heartbeat period. Long enough not to multiply backend invocations,
/// short enough to beat the platform's ten minute idle timeout.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of automatic reconnection attempts after a drop.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default reconnection delays. The N-th attempt waits the N-th entry; attempts
/// past the end reuse the last entry.
pub const DEFAULT_BACKOFF_SCHEDULE: [Duration; 6] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(16),
    Duration::from_secs(30),
];

/// Default upper bound for the fallback poll interval while fetches fail.
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(30);

/// Default cap on the failure exponent applied to the poll interval.
pub const DEFAULT_POLL_MAX_EXPONENT: u32 = 5;

/// Default age after which offline snapshots stop being served.
pub const DEFAULT_CACHE_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Default timeout for a single state fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Floor for the heartbeat period; `tokio::time::interval` rejects zero.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for one mounted game view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Push channel endpoint (`ws://` or `wss://`). `None` disables push and
    /// the view is kept fresh by polling alone.
    pub push_endpoint: Option<String>,
    /// Period between heartbeats while connected.
    ///
    /// Defaults to **5 minutes**. Clamped to at least one second.
    pub heartbeat_interval: Duration,
    /// Automatic reconnection attempts before giving up with `Failed`.
    ///
    /// Defaults to **3**.
    pub max_reconnect_attempts: u32,
    /// Fixed reconnection delay schedule.
    ///
    /// Defaults to **1s, 2s, 4s, 8s, 16s, 30s**.
    pub backoff_schedule: Vec<Duration>,
    /// Capacity of the bounded connection event channel.
    ///
    /// When the consumer cannot keep up, non-state events are dropped with a
    /// warning. State changes are always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the push channel task gets to close its transport on shutdown
    /// before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Upper bound for the poll interval after repeated fetch failures.
    ///
    /// Defaults to **30 seconds**.
    pub poll_ceiling: Duration,
    /// Cap on the failure exponent (`interval * 2^failures`).
    ///
    /// Defaults to **5**.
    pub poll_max_exponent: u32,
    /// Age after which an offline snapshot is no longer served.
    ///
    /// Defaults to **24 hours**.
    pub cache_horizon: Duration,
    /// Timeout for a single state fetch; a timeout counts as a failed fetch.
    ///
    /// Defaults to **10 seconds**.
    pub fetch_timeout: Duration,
}

impl SyncConfig {
    /// A configuration with every default and push disabled.
    pub fn new() -> Self {
        Self {
            push_endpoint: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff_schedule: DEFAULT_BACKOFF_SCHEDULE.to_vec(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            poll_ceiling: DEFAULT_POLL_CEILING,
            poll_max_exponent: DEFAULT_POLL_MAX_EXPONENT,
            cache_horizon: DEFAULT_CACHE_HORIZON,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Enable push using the given endpoint.
    #[must_use]
    pub fn with_push_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.push_endpoint = Some(endpoint.into());
        self
    }

    /// Set the heartbeat period. Clamped to at least one second.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    /// Set the automatic reconnection budget. Zero disables reconnection.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Replace the reconnection delay schedule. An empty schedule keeps the
    /// default.
    #[must_use]
    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        if !schedule.is_empty() {
            self.backoff_schedule = schedule;
        }
        self
    }

    /// Set the capacity of the connection event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the poll interval ceiling used while fetches keep failing.
    #[must_use]
    pub fn with_poll_ceiling(mut self, ceiling: Duration) -> Self {
        self.poll_ceiling = ceiling;
        self
    }

    /// Set the cap on the poll failure exponent.
    #[must_use]
    pub fn with_poll_max_exponent(mut self, exponent: u32) -> Self {
        self.poll_max_exponent = exponent;
        self
    }

    /// Set how long offline snapshots remain usable.
    #[must_use]
    pub fn with_cache_horizon(mut self, horizon: Duration) -> Self {
        self.cache_horizon = horizon;
        self
    }

    /// Set the timeout for a single state fetch.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Delay before reconnection attempt `attempt` (1-based). Attempts past
    /// the end of the schedule reuse its last entry.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.backoff_schedule
            .get(index)
            .or_else(|| self.backoff_schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
